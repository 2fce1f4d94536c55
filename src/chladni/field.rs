use std::f32::consts::PI;
use std::fmt;

use serde::Deserialize;

use crate::audio::analyser::AnalysisFrame;

pub const BASS_FLOOR: f32 = 0.21;
pub const MID_FLOOR: f32 = 0.15;
pub const TREBLE_FLOOR: f32 = 0.09;

const BASS_WEIGHT: f32 = 1.2;
const TREBLE_WEIGHT: f32 = 0.8;
const BASS_SPLIT: f32 = 0.15;
const MID_SPLIT: f32 = 0.5;

/// (amplitude, angular speed in rad/s) of the synthetic motion used when the
/// analyser reports pure silence.
const BASS_IDLE_WAVE: (f32, f32) = (0.10, 0.5);
const MID_IDLE_WAVE: (f32, f32) = (0.08, 0.8);
const TREBLE_IDLE_WAVE: (f32, f32) = (0.06, 1.2);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PatternVariant {
    #[default]
    Square,
    Circle,
    Cross,
}

impl PatternVariant {
    pub const ALL: [PatternVariant; 3] = [
        PatternVariant::Square,
        PatternVariant::Circle,
        PatternVariant::Cross,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PatternVariant::Square => "square",
            PatternVariant::Circle => "circle",
            PatternVariant::Cross => "cross",
        }
    }
}

impl fmt::Display for PatternVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bass / mid / treble energy of one frame, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrequencyBands {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

impl Default for FrequencyBands {
    fn default() -> Self {
        Self::floors()
    }
}

impl FrequencyBands {
    pub fn floors() -> Self {
        Self {
            bass: BASS_FLOOR,
            mid: MID_FLOOR,
            treble: TREBLE_FLOOR,
        }
    }

    /// Bands for one tick. A missing frame is treated like silence.
    pub fn from_frame(frame: Option<&AnalysisFrame>, elapsed: f32) -> Self {
        match frame {
            Some(frame) => Self::from_bins(frame.bins(), elapsed),
            None => Self::synthetic(elapsed),
        }
    }

    /// Weighted averages over the first 15%, next 35% and last 50% of the
    /// bins. A silent frame falls back to [`synthetic`](Self::synthetic) so
    /// the field keeps moving.
    pub fn from_bins(bins: &[u8], elapsed: f32) -> Self {
        if bins.iter().all(|&b| b == 0) {
            return Self::synthetic(elapsed);
        }

        let len = bins.len();
        let bass_end = (len as f32 * BASS_SPLIT).floor() as usize;
        let mid_end = (len as f32 * MID_SPLIT).floor() as usize;

        let average = |range: &[u8], weight: f32| -> f32 {
            if range.is_empty() {
                return 0.0;
            }
            let sum: f32 = range.iter().map(|&b| b as f32 * weight).sum();
            sum / range.len() as f32 / 255.0
        };

        Self {
            bass: average(&bins[..bass_end], BASS_WEIGHT),
            mid: average(&bins[bass_end..mid_end], 1.0),
            treble: average(&bins[mid_end..], TREBLE_WEIGHT),
        }
        .floored()
    }

    /// Slow floor-anchored sinusoids, one speed per band.
    pub fn synthetic(elapsed: f32) -> Self {
        let t = if elapsed.is_finite() { elapsed.max(0.0) } else { 0.0 };
        let wave = |(amp, speed): (f32, f32)| amp * (speed * t).sin().abs();
        Self {
            bass: BASS_FLOOR + wave(BASS_IDLE_WAVE),
            mid: MID_FLOOR + wave(MID_IDLE_WAVE),
            treble: TREBLE_FLOOR + wave(TREBLE_IDLE_WAVE),
        }
    }

    fn floored(self) -> Self {
        Self {
            bass: self.bass.clamp(BASS_FLOOR, 1.0),
            mid: self.mid.clamp(MID_FLOOR, 1.0),
            treble: self.treble.clamp(TREBLE_FLOOR, 1.0),
        }
    }
}

/// Plate mode numbers `(n, m)` for the current energy.
pub fn mode_numbers(complexity: u32, bands: &FrequencyBands) -> (f32, f32) {
    let c = complexity as f32;
    (c * (2.0 * bands.bass).max(0.8), c * (2.0 * bands.mid).max(0.8))
}

/// Plate displacement at centre-relative `(x, y)` on a `width` x `height` plate.
pub fn field_value(
    variant: PatternVariant,
    n: f32,
    m: f32,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
) -> f32 {
    let square = |n: f32, m: f32| (n * PI * x / width).sin() * (m * PI * y / height).sin();
    match variant {
        PatternVariant::Square => square(n, m),
        PatternVariant::Circle => {
            let r = (x * x + y * y).sqrt() / (width / 2.0);
            let theta = y.atan2(x);
            (n * r).sin() * (m * theta).cos()
        }
        PatternVariant::Cross => square(n, m) + square(m, n),
    }
}

/// Particles with `|z|` under this sit on a node line.
pub fn node_threshold(mid: f32) -> f32 {
    0.05 * (1.0 + mid).max(1.0)
}

/// Half-width of the random step taken by a node-line particle.
pub fn jitter_range(treble: f32) -> f32 {
    3.0 + 8.0 * treble
}

pub fn sprite_size(base: f32, bass: f32) -> f32 {
    (base * (1.0 + 2.0 * bass)).max(1.5)
}
