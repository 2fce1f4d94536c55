use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::decode::DecodedAudio;

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32768;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyserSettings {
    pub fft_size: usize,
    /// Weight of the previous magnitude when averaging across reads (0.0-1.0)
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// One snapshot of byte magnitudes, one per frequency bin.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnalysisFrame {
    bins: Vec<u8>,
    timestamp: f64,
    sample_rate: u32,
}

impl AnalysisFrame {
    pub fn new(bin_count: usize, sample_rate: u32) -> Self {
        Self {
            bins: vec![0; bin_count],
            timestamp: 0.0,
            sample_rate,
        }
    }

    pub fn from_bins(bins: Vec<u8>, sample_rate: u32) -> Self {
        Self {
            bins,
            timestamp: 0.0,
            sample_rate,
        }
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Playback position (seconds) the frame was captured at.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    pub fn is_silent(&self) -> bool {
        self.bins.iter().all(|&b| b == 0)
    }
}

/// Non-audible monitoring point of a playback session.
///
/// Mirrors a browser analyser node: Blackman-windowed FFT over the most
/// recent `fft_size` samples, magnitudes averaged across reads, then mapped
/// from the `[min_decibels, max_decibels]` window onto `0..=255`.
pub struct AnalysisTap {
    settings: AnalyserSettings,
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl AnalysisTap {
    pub fn new(settings: AnalyserSettings, sample_rate: u32) -> Self {
        let mut settings = settings;
        settings.fft_size = normalize_fft_size(settings.fft_size);
        settings.smoothing_time_constant = settings.smoothing_time_constant.clamp(0.0, 1.0);
        if settings.max_decibels <= settings.min_decibels {
            let defaults = AnalyserSettings::default();
            log::warn!(
                "Invalid decibel range [{}, {}], using [{}, {}]",
                settings.min_decibels,
                settings.max_decibels,
                defaults.min_decibels,
                defaults.max_decibels
            );
            settings.min_decibels = defaults.min_decibels;
            settings.max_decibels = defaults.max_decibels;
        }

        let fft_size = settings.fft_size;
        Self {
            settings,
            sample_rate,
            fft: FftPlanner::<f32>::new().plan_fft_forward(fft_size),
            window: blackman_window(fft_size),
            smoothed: vec![0.0; fft_size / 2],
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    pub fn fft_size(&self) -> usize {
        self.settings.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Changes frequency resolution. Consumers pick up the new bin count on
    /// their next read.
    pub fn set_fft_size(&mut self, fft_size: usize) {
        let fft_size = normalize_fft_size(fft_size);
        if fft_size == self.settings.fft_size {
            return;
        }
        log::debug!("Analyser FFT size {} -> {}", self.settings.fft_size, fft_size);
        *self = Self::new(
            AnalyserSettings {
                fft_size,
                ..self.settings
            },
            self.sample_rate,
        );
    }

    /// Forget magnitude history, e.g. when a fresh output node starts.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }

    /// Fill `frame` from the samples that played up to `position` seconds.
    pub fn capture(&mut self, audio: &DecodedAudio, position: f64, frame: &mut AnalysisFrame) {
        let n = self.settings.fft_size;
        let bin_count = n / 2;

        let end = if position.is_finite() && position > 0.0 {
            ((position * self.sample_rate as f64).round() as usize).min(audio.frames())
        } else {
            0
        };
        let start = end as isize - n as isize;

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let idx = start + i as isize;
            let sample = if idx < 0 { 0.0 } else { audio.mono_sample(idx as usize) };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        if frame.bins.len() != bin_count {
            frame.bins.resize(bin_count, 0);
        }
        frame.timestamp = position;
        frame.sample_rate = self.sample_rate;

        let tau = self.settings.smoothing_time_constant;
        let min_db = self.settings.min_decibels;
        let scale = 255.0 / (self.settings.max_decibels - min_db);

        for (k, byte) in frame.bins.iter_mut().enumerate() {
            let magnitude = self.buffer[k].norm() / n as f32;
            let smoothed = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            self.smoothed[k] = if smoothed.is_finite() { smoothed } else { 0.0 };

            *byte = if self.smoothed[k] <= 0.0 {
                0
            } else {
                let db = 20.0 * self.smoothed[k].log10();
                (scale * (db - min_db)).floor().clamp(0.0, 255.0) as u8
            };
        }
    }
}

fn normalize_fft_size(fft_size: usize) -> usize {
    fft_size
        .clamp(MIN_FFT_SIZE, MAX_FFT_SIZE)
        .next_power_of_two()
        .min(MAX_FFT_SIZE)
}

fn blackman_window(size: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
        })
        .collect()
}
