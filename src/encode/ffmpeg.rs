use anyhow::{Context, Result};
use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

#[derive(Clone, Debug, PartialEq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
}

/// Audio muxed under the video, starting `offset` seconds into the file.
#[derive(Clone, Copy, Debug)]
pub struct AudioTrack<'a> {
    pub path: &'a Path,
    pub offset: f64,
}

pub struct FfmpegEncoder {
    child: Child,
    frame_len: usize,
    frames: u64,
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, audio: Option<AudioTrack<'_>>, video: &VideoSettings) -> Result<Self> {
        let args = build_args(output_path, audio, video);
        log::debug!("ffmpeg {}", args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            video.width,
            video.height,
            video.fps,
            video.codec
        );

        Ok(Self {
            child,
            frame_len: video.width as usize * video.height as usize * 4,
            frames: 0,
        })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        anyhow::ensure!(
            rgba_pixels.len() == self.frame_len,
            "Frame is {} bytes, expected {}",
            rgba_pixels.len(),
            self.frame_len
        );
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn finish(mut self) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete ({} frames)", self.frames);
        Ok(())
    }
}

fn build_args(output_path: &Path, audio: Option<AudioTrack<'_>>, video: &VideoSettings) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();

    push_args(&mut args, &["-y", "-f", "rawvideo", "-pixel_format", "rgba"]);
    push_args(&mut args, &["-video_size", &format!("{}x{}", video.width, video.height)]);
    push_args(&mut args, &["-framerate", &video.fps.to_string()]);
    push_args(&mut args, &["-i", "pipe:0"]);

    if let Some(track) = audio {
        if track.offset > 0.0 && track.offset.is_finite() {
            push_args(&mut args, &["-ss", &format!("{:.3}", track.offset)]);
        }
        push_args(&mut args, &["-i"]);
        args.push(track.path.as_os_str().to_owned());
    }

    push_args(&mut args, &["-c:v", &video.codec, "-pix_fmt", &video.pix_fmt]);
    push_args(&mut args, &["-crf", &video.crf.to_string(), "-preset", "medium"]);
    if audio.is_some() {
        push_args(&mut args, &["-c:a", "aac", "-b:a", "192k", "-shortest"]);
    }
    args.push(output_path.as_os_str().to_owned());
    args
}

fn push_args(args: &mut Vec<OsString>, values: &[&str]) {
    args.extend(values.iter().map(OsString::from));
}
