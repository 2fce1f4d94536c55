pub mod audio;
pub mod chladni;
pub mod config;
pub mod encode;
pub mod engine;
pub mod playback;
pub mod render;
pub mod spectrum;
