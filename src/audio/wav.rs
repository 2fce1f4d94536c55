use std::io::{Cursor, Seek, Write};

use hound::{SampleFormat, WavSpec, WavWriter};

use super::decode::DecodedAudio;

pub const HEADER_LEN: usize = 44;
const BITS_PER_SAMPLE: u16 = 16;
const FORMAT_PCM: u16 = 1;

/// Scale a float sample to i16, clamping to the representable range.
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

pub fn encode_wav(audio: &DecodedAudio) -> Result<Vec<u8>, hound::Error> {
    let data_len = audio.frames() * audio.channel_count() * 2;
    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LEN + data_len));
    write_wav(audio, &mut cursor)?;
    Ok(cursor.into_inner())
}

/// Write `audio` as 16-bit PCM with a 44-byte format-1 header.
pub fn write_wav<W: Write + Seek>(audio: &DecodedAudio, mut writer: W) -> Result<(), hound::Error> {
    let channels = u16::try_from(audio.channel_count()).map_err(|_| hound::Error::Unsupported)?;
    if channels > 2 {
        return write_multichannel(audio, channels, &mut writer);
    }

    let spec = WavSpec {
        channels,
        sample_rate: audio.sample_rate(),
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };
    let mut wav = WavWriter::new(writer, spec)?;
    for frame in 0..audio.frames() {
        for channel in audio.channels() {
            wav.write_sample(sample_to_i16(channel[frame]))?;
        }
    }
    wav.finalize()
}

// hound switches to WAVE_FORMAT_EXTENSIBLE above two channels; keep format 1.
fn write_multichannel<W: Write>(audio: &DecodedAudio, channels: u16, writer: &mut W) -> Result<(), hound::Error> {
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = u32::try_from(audio.sample_rate() as u64 * block_align as u64)
        .map_err(|_| hound::Error::Unsupported)?;
    let data_len = u32::try_from(audio.frames() as u64 * block_align as u64)
        .map_err(|_| hound::Error::TooWide)?;
    let riff_len = data_len.checked_add(36).ok_or(hound::Error::TooWide)?;

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&riff_len.to_le_bytes());
    header.extend_from_slice(b"WAVEfmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    header.extend_from_slice(&channels.to_le_bytes());
    header.extend_from_slice(&audio.sample_rate().to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len.to_le_bytes());
    writer.write_all(&header)?;

    let mut frame_bytes = Vec::with_capacity(block_align as usize);
    for frame in 0..audio.frames() {
        frame_bytes.clear();
        for channel in audio.channels() {
            frame_bytes.extend_from_slice(&sample_to_i16(channel[frame]).to_le_bytes());
        }
        writer.write_all(&frame_bytes)?;
    }
    writer.flush()?;
    Ok(())
}
