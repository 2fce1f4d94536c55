mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chladni_viz::audio::decode::{mime_for_path, AudioDecodeService, DecodedAudio, RawAsset};
use chladni_viz::audio::wav::write_wav;
use chladni_viz::chladni::{PatternConfig, PatternVariant};
use chladni_viz::config::{self, Config};
use chladni_viz::encode::ffmpeg::{AudioTrack, FfmpegEncoder, VideoSettings};
use chladni_viz::engine::{Visualizer, VisualizerSettings};
use chladni_viz::playback::backend::OfflineBackend;
use chladni_viz::playback::format_time;
use chladni_viz::render::scene::{SceneLayout, SceneRenderer};
use cli::Cli;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect chladni.toml / global config
    let config_path = cli.config.clone().or_else(config::find_config_path);
    let cfg = match config_path {
        Some(ref path) => match config::load_config(path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };
    // Merge: config values apply only when CLI is at its default
    if cli.width == 1280 { cli.width = cfg.output.width; }
    if cli.height == 720 { cli.height = cfg.output.height; }
    if cli.fps == 60 { cli.fps = cfg.output.fps; }
    if cli.crf == 18 { cli.crf = cfg.output.crf; }
    if cli.codec == "libx264" { cli.codec = cfg.output.codec.clone(); }
    if cli.pix_fmt == "yuv420p" { cli.pix_fmt = cfg.output.pix_fmt.clone(); }
    if cli.pattern == PatternVariant::Square { cli.pattern = cfg.chladni.pattern; }
    if cli.complexity == 10 { cli.complexity = cfg.chladni.complexity; }
    if cli.seed.is_none() { cli.seed = cfg.chladni.seed; }

    anyhow::ensure!(cli.fps > 0, "--fps must be positive");
    anyhow::ensure!(cli.width > 0 && cli.height > 0, "Video size must be non-zero");

    let bytes = std::fs::read(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let name = cli
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.input.display().to_string());
    let mime = mime_for_path(&cli.input);

    if cli.probe || cli.export_wav.is_some() {
        let mut asset = RawAsset::new(bytes, name);
        if let Some(mime) = mime {
            asset = asset.with_mime(mime);
        }
        let audio = AudioDecodeService::new()
            .decode(&asset)
            .with_context(|| format!("Failed to decode {}", cli.input.display()))?;

        if cli.probe {
            println!("{}", asset.name);
            println!("  channels:    {}", audio.channel_count());
            println!("  sample rate: {} Hz", audio.sample_rate());
            println!("  frames:      {}", audio.frames());
            println!("  duration:    {} ({:.3}s)", format_time(audio.duration()), audio.duration());
        }
        if let Some(ref path) = cli.export_wav {
            export_wav(&audio, path)?;
            log::info!("Wrote {}", path.display());
        }
        return Ok(());
    }

    render(&cli, &cfg, bytes, name, mime)
}

fn render(cli: &Cli, cfg: &Config, bytes: Vec<u8>, name: String, mime: Option<&str>) -> Result<()> {
    log::info!("chladni-viz - audio-driven Chladni plate visualizer");
    log::info!("Input: {}", cli.input.display());
    log::info!("Output: {}", cli.output.display());
    log::info!("Pattern: {} (complexity {})", cli.pattern, cli.complexity);
    log::info!("Resolution: {}x{} @ {}fps", cli.width, cli.height, cli.fps);

    let layout = SceneLayout::new(cli.width, cli.height);
    let mut simulation = cfg.simulation_settings();
    simulation.seed = cli.seed;
    let settings = VisualizerSettings {
        playback: cfg.playback_settings(),
        simulation,
        pattern: PatternConfig::new(cli.pattern, cli.complexity),
        ..VisualizerSettings::default()
    };
    let mut vis = Visualizer::new(Box::new(OfflineBackend::new()), settings);
    vis.resize(layout.field_size(), layout.panel_size());

    // 1. Decode in the background
    vis.load(bytes, name, mime)?;
    let spinner = ProgressBar::new_spinner();
    spinner.set_message("Decoding audio...");
    let loaded = loop {
        if let Some(result) = vis.poll_decode() {
            break result;
        }
        spinner.tick();
        std::thread::sleep(Duration::from_millis(20));
    };
    spinner.finish_and_clear();
    loaded.with_context(|| format!("Failed to load {}", cli.input.display()))?;

    let audio: Arc<DecodedAudio> = vis
        .audio()
        .cloned()
        .context("No audio after a successful load")?;

    // 2. Position and play
    if let Some(seek) = cli.seek {
        vis.seek(seek)?;
    }
    vis.play()?;
    let start = vis.position();
    let mut remaining = (vis.duration() - start).max(0.0);
    if let Some(limit) = cli.duration {
        remaining = remaining.min(limit.max(0.0));
    }
    let total_frames = (remaining * cli.fps as f64).ceil() as u64;
    log::info!(
        "Total frames: {}, Duration: {:.1}s from {}",
        total_frames,
        remaining,
        format_time(start)
    );

    // 3. Audio track for the muxer
    let wav_path = std::env::temp_dir().join(format!("chladni-viz-{}.wav", std::process::id()));
    export_wav(&audio, &wav_path)?;

    let video = VideoSettings {
        width: cli.width,
        height: cli.height,
        fps: cli.fps,
        codec: cli.codec.clone(),
        pix_fmt: cli.pix_fmt.clone(),
        crf: cli.crf,
    };
    let result = encode(&mut vis, &video, cli, &wav_path, start, total_frames);

    if let Err(e) = std::fs::remove_file(&wav_path) {
        log::debug!("Could not remove {}: {}", wav_path.display(), e);
    }
    vis.clear();
    result?;

    log::info!("Done! Output: {}", cli.output.display());
    Ok(())
}

fn encode(
    vis: &mut Visualizer,
    video: &VideoSettings,
    cli: &Cli,
    wav_path: &Path,
    start: f64,
    total_frames: u64,
) -> Result<()> {
    let mut encoder = FfmpegEncoder::new(
        &cli.output,
        Some(AudioTrack {
            path: wav_path,
            offset: start,
        }),
        video,
    )?;
    let mut renderer = SceneRenderer::new(video.width, video.height);

    let pb = ProgressBar::new(total_frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    let dt = 1.0 / video.fps as f64;
    for frame_idx in 0..total_frames {
        let Some(output) = vis.frame(dt) else {
            log::warn!("Frame loop stopped early at frame {}", frame_idx);
            break;
        };
        let pixels = renderer.render(&output);
        encoder.write_frame(pixels)?;
        pb.set_position(frame_idx + 1);
    }

    pb.finish_with_message("Rendering complete");

    log::info!("Finishing encoding...");
    encoder.finish()
}

fn export_wav(audio: &DecodedAudio, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_wav(audio, &mut writer).with_context(|| format!("Failed to write {}", path.display()))?;
    writer.flush().with_context(|| format!("Failed to write {}", path.display()))
}
