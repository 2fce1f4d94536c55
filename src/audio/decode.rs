use std::io::Cursor;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// MIME types the decoder knows a container hint for, with the matching extension.
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/wave", "wav"),
    ("audio/flac", "flac"),
    ("audio/x-flac", "flac"),
    ("audio/ogg", "ogg"),
    ("audio/vorbis", "ogg"),
    ("audio/aac", "aac"),
    ("audio/mp4", "m4a"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("audio data is empty")]
    Empty,
    #[error("unsupported audio format: {0}")]
    Unsupported(String),
    #[error("audio decoder failed: {0}")]
    BackendFailure(String),
}

/// Uploaded file bytes as handed over by the file picker.
#[derive(Clone, Debug)]
pub struct RawAsset {
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
    pub name: String,
}

impl RawAsset {
    pub fn new(bytes: Vec<u8>, name: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: None,
            name: name.into(),
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Only `audio/*` uploads are accepted. A missing MIME is left to the decoder.
    pub fn is_audio_mime(&self) -> bool {
        self.mime
            .as_deref()
            .map_or(true, |mime| mime.trim().to_ascii_lowercase().starts_with("audio/"))
    }

    fn hint(&self) -> Hint {
        let mut hint = Hint::new();
        if let Some(ext) = Path::new(&self.name).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        } else if let Some(ext) = self.mime.as_deref().and_then(extension_for_mime) {
            hint.with_extension(ext);
        }
        if let Some(ref mime) = self.mime {
            hint.mime_type(mime);
        }
        hint
    }
}

pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let mime = mime.trim().to_ascii_lowercase();
    MIME_EXTENSIONS
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, ext)| *ext)
}

/// Best-effort MIME for a file on disk, used when the host reads files itself.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    MIME_EXTENSIONS
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(mime, _)| *mime)
}

/// Decoded PCM, one sample vector per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    /// Channels shorter than the longest one are padded with silence.
    pub fn new(sample_rate: u32, mut channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in &mut channels {
            channel.resize(frames, 0.0);
        }
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn silent(sample_rate: u32, channel_count: usize, seconds: f64) -> Self {
        let frames = (sample_rate as f64 * seconds.max(0.0)).round() as usize;
        Self::new(sample_rate, vec![vec![0.0; frames]; channel_count])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Channel-averaged sample at `frame`; silence outside the buffer.
    pub fn mono_sample(&self, frame: usize) -> f32 {
        if self.channels.is_empty() || frame >= self.frames() {
            return 0.0;
        }
        let sum: f32 = self.channels.iter().map(|c| c[frame]).sum();
        sum / self.channels.len() as f32
    }
}

/// Turns raw upload bytes into [`DecodedAudio`] through symphonia.
///
/// The service holds no state, so decoding the same bytes twice gives the same
/// result and never interferes with a decode running on another thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct AudioDecodeService;

impl AudioDecodeService {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, asset: &RawAsset) -> Result<DecodedAudio, DecodeError> {
        if asset.bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let source = Cursor::new(asset.bytes.clone());
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &asset.hint(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Unsupported("no audio tracks found".into()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::BackendFailure("unknown sample rate".into()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        let mut channels: Vec<Vec<f32>> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(DecodeError::BackendFailure(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(err)) => {
                    log::debug!("Skipping corrupt packet in {}: {}", asset.name, err);
                    continue;
                }
                Err(e) => return Err(DecodeError::BackendFailure(e.to_string())),
            };

            let spec = *decoded.spec();
            let channel_count = spec.channels.count().max(1);
            let num_frames = decoded.frames();
            if num_frames == 0 {
                continue;
            }

            let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            if channels.len() < channel_count {
                let frames_so_far = channels.first().map_or(0, Vec::len);
                channels.resize_with(channel_count, || vec![0.0; frames_so_far]);
            }

            // Deinterleave
            for frame_samples in sample_buf.samples().chunks(channel_count) {
                for (channel, &sample) in channels.iter_mut().zip(frame_samples) {
                    channel.push(sample);
                }
            }
        }

        let audio = DecodedAudio::new(sample_rate, channels);
        if audio.frames() == 0 {
            return Err(DecodeError::Unsupported("no audio frames decoded".into()));
        }

        log::info!(
            "Decoded {}: {} channel(s), {} frames, {}Hz, {:.1}s",
            asset.name,
            audio.channel_count(),
            audio.frames(),
            sample_rate,
            audio.duration()
        );

        Ok(audio)
    }

    /// Decodes on the rayon pool so the frame loop is never blocked.
    pub fn decode_async(&self, asset: RawAsset) -> PendingDecode {
        let (sender, receiver) = mpsc::channel();
        let service = *self;
        let name = asset.name.clone();
        rayon::spawn(move || {
            let result = service.decode(&asset);
            // The receiver is gone when the load was superseded or cleared.
            let _ = sender.send(result);
        });
        PendingDecode {
            name,
            receiver,
            delivered: false,
        }
    }
}

/// Handle to a decode running in the background.
///
/// Delivers exactly one result, success or failure, then stays quiet.
pub struct PendingDecode {
    name: String,
    receiver: Receiver<Result<DecodedAudio, DecodeError>>,
    delivered: bool,
}

impl PendingDecode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// Non-blocking check; `None` while the decode is still running.
    pub fn poll(&mut self) -> Option<Result<DecodedAudio, DecodeError>> {
        if self.delivered {
            return None;
        }
        let result = match self.receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(DecodeError::BackendFailure(
                "decode worker exited without a result".into(),
            )),
        };
        self.delivered = true;
        Some(result)
    }

    /// Blocks until the result arrives.
    pub fn wait(mut self) -> Result<DecodedAudio, DecodeError> {
        if self.delivered {
            return Err(DecodeError::BackendFailure("result already delivered".into()));
        }
        self.delivered = true;
        self.receiver.recv().unwrap_or_else(|_| {
            Err(DecodeError::BackendFailure(
                "decode worker exited without a result".into(),
            ))
        })
    }
}
