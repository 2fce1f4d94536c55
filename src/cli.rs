use clap::Parser;
use std::path::PathBuf;

use chladni_viz::chladni::PatternVariant;

#[derive(Parser, Debug)]
#[command(name = "chladni-viz", about = "Render Chladni plate and spectrum visuals synchronized to an audio file")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: PathBuf,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Plate pattern
    #[arg(short, long, value_enum, default_value_t = PatternVariant::Square)]
    pub pattern: PatternVariant,

    /// Plate mode complexity (2-20)
    #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(2..=20))]
    pub complexity: u32,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// H.264 CRF quality (0-51, lower = better)
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// Start playback at this position (seconds)
    #[arg(long)]
    pub seek: Option<f64>,

    /// Stop after this many seconds of playback
    #[arg(long)]
    pub duration: Option<f64>,

    /// Write the decoded audio as 16-bit PCM WAV and exit
    #[arg(long, value_name = "PATH")]
    pub export_wav: Option<PathBuf>,

    /// Print decoded stream details and exit
    #[arg(long)]
    pub probe: bool,

    /// Fixed seed for particle placement
    #[arg(long)]
    pub seed: Option<u64>,

    /// Config file (default: ./chladni.toml, then ~/.config/chladni-viz/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
