use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::analyser::AnalyserSettings;
use crate::chladni::{PatternConfig, PatternVariant, SimulationSettings};
use crate::playback::PlaybackSettings;

pub const APP_NAME: &str = "chladni-viz";
pub const LOCAL_CONFIG: &str = "chladni.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analyser: AnalyserConfig,
    #[serde(default)]
    pub chladni: ChladniConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyserConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_min_db")]
    pub min_db: f32,
    #[serde(default = "default_max_db")]
    pub max_db: f32,
    #[serde(default = "default_gain")]
    pub gain: f32,
}

#[derive(Debug, Deserialize)]
pub struct ChladniConfig {
    #[serde(default)]
    pub pattern: PatternVariant,
    #[serde(default = "default_complexity")]
    pub complexity: u32,
    #[serde(default = "default_particles")]
    pub particles: usize,
    #[serde(default = "default_active_particles")]
    pub active_particles: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
        }
    }
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_db: default_min_db(),
            max_db: default_max_db(),
            gain: default_gain(),
        }
    }
}

impl Default for ChladniConfig {
    fn default() -> Self {
        Self {
            pattern: PatternVariant::default(),
            complexity: default_complexity(),
            particles: default_particles(),
            active_particles: default_active_particles(),
            seed: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 60 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_fft_size() -> usize { 2048 }
fn default_smoothing() -> f32 { 0.8 }
fn default_min_db() -> f32 { -100.0 }
fn default_max_db() -> f32 { -30.0 }
fn default_gain() -> f32 { 0.01 }
fn default_complexity() -> u32 { 10 }
fn default_particles() -> usize { 5000 }
fn default_active_particles() -> usize { 2000 }
fn default_settle_ms() -> u64 { 100 }

impl Config {
    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            gain: self.analyser.gain,
            settle_secs: self.playback.settle_ms as f64 / 1000.0,
            analyser: AnalyserSettings {
                fft_size: self.analyser.fft_size,
                smoothing_time_constant: self.analyser.smoothing,
                min_decibels: self.analyser.min_db,
                max_decibels: self.analyser.max_db,
            },
        }
    }

    pub fn simulation_settings(&self) -> SimulationSettings {
        SimulationSettings {
            particle_count: self.chladni.particles,
            active_particles: self.chladni.active_particles,
            settle_secs: self.playback.settle_ms as f32 / 1000.0,
            seed: self.chladni.seed,
        }
    }

    pub fn pattern(&self) -> PatternConfig {
        PatternConfig::new(self.chladni.pattern, self.chladni.complexity)
    }
}

/// `chladni.toml` in the working directory, then
/// `~/.config/chladni-viz/config.toml`, then the platform config dir.
pub fn find_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join(APP_NAME).join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join(APP_NAME).join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

/// Read and parse a config file. Problems are logged and yield `None` so the
/// caller falls back to defaults.
pub fn load_config(path: &Path) -> Option<Config> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("Could not read config {}: {}", path.display(), e);
            return None;
        }
    };
    match parse_config(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Ignoring invalid config {}: {}", path.display(), e);
            None
        }
    }
}

pub fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}
