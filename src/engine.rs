use std::sync::Arc;

use thiserror::Error;

use crate::audio::analyser::AnalysisFrame;
use crate::audio::decode::{AudioDecodeService, DecodeError, DecodedAudio, PendingDecode, RawAsset};
use crate::chladni::{
    ChladniSimulator, FrequencyBands, PatternConfig, PatternVariant, SimulationSettings, Sprite,
};
use crate::playback::backend::AudioBackend;
use crate::playback::{PlaybackController, PlaybackError, PlaybackSettings, PlaybackState};
use crate::spectrum::{SpectrumAnalyzer, SpectrumView};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisualizerSettings {
    pub playback: PlaybackSettings,
    pub simulation: SimulationSettings,
    pub pattern: PatternConfig,
    /// Particle canvas (width, height) in pixels
    pub field_size: (u32, u32),
    /// Size of each spectrum panel (width, height) in pixels
    pub spectrum_panel: (u32, u32),
}

impl Default for VisualizerSettings {
    fn default() -> Self {
        Self {
            playback: PlaybackSettings::default(),
            simulation: SimulationSettings::default(),
            pattern: PatternConfig::default(),
            field_size: (720, 720),
            spectrum_panel: (560, 360),
        }
    }
}

/// Everything a host needs to draw one frame.
pub struct FrameOutput<'a> {
    pub frame: &'a AnalysisFrame,
    pub bands: FrequencyBands,
    /// `None` until a playing session produced a frame
    pub spectrum: Option<&'a SpectrumView>,
    pub sprites: &'a [Sprite],
    pub position: f64,
    pub duration: f64,
    pub state: PlaybackState,
}

pub struct Visualizer {
    decoder: AudioDecodeService,
    controller: PlaybackController,
    spectrum: SpectrumAnalyzer,
    simulator: ChladniSimulator,
    pending: Option<PendingDecode>,
    /// Live frame-loop subscription, if any
    subscription: Option<u64>,
    next_subscription: u64,
    frame: AnalysisFrame,
    file_name: Option<String>,
}

impl Visualizer {
    pub fn new(backend: Box<dyn AudioBackend>, settings: VisualizerSettings) -> Self {
        let (field_w, field_h) = settings.field_size;
        let (panel_w, panel_h) = settings.spectrum_panel;
        Self {
            decoder: AudioDecodeService::new(),
            controller: PlaybackController::new(backend, settings.playback),
            spectrum: SpectrumAnalyzer::new(panel_w, panel_h),
            simulator: ChladniSimulator::new(settings.pattern, field_w, field_h, settings.simulation),
            pending: None,
            subscription: None,
            next_subscription: 0,
            frame: AnalysisFrame::default(),
            file_name: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.controller.state()
    }

    pub fn position(&self) -> f64 {
        self.controller.position()
    }

    pub fn duration(&self) -> f64 {
        self.controller.duration()
    }

    pub fn audio(&self) -> Option<&Arc<DecodedAudio>> {
        self.controller.audio()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn pattern(&self) -> PatternConfig {
        self.simulator.config()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Message for the single error banner, cleared by the next load or clear.
    pub fn error_banner(&self) -> Option<&str> {
        self.controller.last_error()
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn simulator(&self) -> &ChladniSimulator {
        &self.simulator
    }

    /// Start decoding an upload in the background. Poll with
    /// [`poll_decode`](Self::poll_decode) until it completes.
    pub fn load(
        &mut self,
        bytes: Vec<u8>,
        name: impl Into<String>,
        mime: Option<&str>,
    ) -> Result<(), EngineError> {
        self.cancel_subscription();
        self.pending = None;

        let mut asset = RawAsset::new(bytes, name);
        if let Some(mime) = mime {
            asset = asset.with_mime(mime);
        }
        if !asset.is_audio_mime() {
            let err = DecodeError::Unsupported(format!(
                "'{}' is not an audio file ({})",
                asset.name,
                mime.unwrap_or_default()
            ));
            self.controller.fail(&err);
            return Err(err.into());
        }

        log::info!("Loading {} ({} bytes)", asset.name, asset.bytes.len());
        self.controller.begin_loading();
        self.spectrum.clear();
        self.file_name = Some(asset.name.clone());
        self.pending = Some(self.decoder.decode_async(asset));
        Ok(())
    }

    /// Pick up a finished background decode. `None` while nothing has
    /// arrived (or nothing is pending).
    pub fn poll_decode(&mut self) -> Option<Result<(), EngineError>> {
        let result = self.pending.as_mut()?.poll()?;
        self.pending = None;
        Some(match result {
            Ok(audio) => self.load_decoded(Arc::new(audio)).map_err(EngineError::from),
            Err(err) => {
                self.controller.fail(&err);
                Err(err.into())
            }
        })
    }

    /// Open a session for already decoded audio and start the frame loop.
    pub fn load_decoded(&mut self, audio: Arc<DecodedAudio>) -> Result<(), PlaybackError> {
        self.cancel_subscription();
        let sample_rate = audio.sample_rate();
        self.controller.load(audio)?;
        let bins = self
            .controller
            .analysis_tap()
            .map_or(0, |tap| tap.bin_count());
        self.frame = AnalysisFrame::new(bins, sample_rate);
        self.spectrum.clear();
        self.simulator.reinitialize(false);
        self.subscribe();
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), PlaybackError> {
        self.controller.play()
    }

    pub fn pause(&mut self) {
        self.controller.pause();
    }

    pub fn toggle_play_pause(&mut self) -> Result<(), PlaybackError> {
        self.controller.toggle()
    }

    pub fn seek(&mut self, position: f64) -> Result<(), PlaybackError> {
        self.controller.seek(position)
    }

    /// Drop the asset and go back to idle. The frame loop is cancelled before
    /// the audio graph is released.
    pub fn clear(&mut self) {
        self.cancel_subscription();
        self.pending = None;
        self.controller.clear();
        self.spectrum.clear();
        self.frame = AnalysisFrame::default();
        self.file_name = None;
        self.simulator.set_running(false);
    }

    pub fn set_pattern_variant(&mut self, variant: PatternVariant) {
        self.simulator.set_pattern_variant(variant);
    }

    pub fn set_complexity(&mut self, complexity: u32) {
        self.simulator.set_complexity(complexity);
    }

    /// Resize the particle canvas and the spectrum panels, each (width, height).
    pub fn resize(&mut self, field: (u32, u32), spectrum_panel: (u32, u32)) {
        self.simulator.resize(field.0, field.1);
        self.spectrum.resize(spectrum_panel.0, spectrum_panel.1);
    }

    /// Run one frame of `dt` seconds. Returns `None` when no frame loop is
    /// subscribed (nothing loaded, or the session failed).
    pub fn frame(&mut self, dt: f64) -> Option<FrameOutput<'_>> {
        self.subscription?;

        if let Err(err) = self.controller.tick(dt) {
            log::warn!("Playback stopped: {}", err);
        }
        if !self.controller.state().has_session() {
            self.cancel_subscription();
            return None;
        }

        self.controller.capture_frame(&mut self.frame);
        let playing = self.controller.is_playing();
        self.simulator.set_running(playing);
        if playing {
            self.spectrum.update(&self.frame);
        }
        if let Err(err) = self.simulator.advance(Some(&self.frame), dt as f32) {
            log::trace!("Field skipped: {}", err);
        }

        Some(FrameOutput {
            frame: &self.frame,
            bands: self.simulator.bands(),
            spectrum: self.spectrum.view(),
            sprites: self.simulator.sprites(),
            position: self.controller.position(),
            duration: self.controller.duration(),
            state: self.controller.state(),
        })
    }

    fn subscribe(&mut self) {
        self.next_subscription += 1;
        self.subscription = Some(self.next_subscription);
        log::debug!("Frame loop {} started", self.next_subscription);
    }

    fn cancel_subscription(&mut self) {
        if let Some(id) = self.subscription.take() {
            log::debug!("Frame loop {} cancelled", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::encode_wav;
    use crate::playback::backend::OfflineBackend;
    use crate::spectrum::{layout_band, Band};
    use std::time::Duration;

    const DT: f64 = 1.0 / 60.0;

    fn visualizer(backend: &OfflineBackend) -> Visualizer {
        let settings = VisualizerSettings {
            simulation: SimulationSettings {
                particle_count: 600,
                active_particles: 300,
                seed: Some(42),
                ..SimulationSettings::default()
            },
            field_size: (200, 200),
            spectrum_panel: (160, 80),
            ..VisualizerSettings::default()
        };
        Visualizer::new(Box::new(backend.clone()), settings)
    }

    fn silent_clip() -> Arc<DecodedAudio> {
        Arc::new(DecodedAudio::silent(44100, 1, 2.0))
    }

    #[test]
    fn silent_clip_runs_field_at_floors() {
        let backend = OfflineBackend::new();
        let mut vis = visualizer(&backend);
        vis.load_decoded(silent_clip()).unwrap();
        vis.play().unwrap();

        let out = vis.frame(DT).unwrap();
        assert_eq!(out.state, PlaybackState::Playing);
        assert!(out.frame.is_silent());
        assert!((out.bands.bass - 0.21).abs() < 0.01);
        assert!((out.bands.mid - 0.15).abs() < 0.01);
        assert!((out.bands.treble - 0.09).abs() < 0.01);

        let spectrum = out.spectrum.unwrap();
        assert!(spectrum.low.iter().all(|bar| bar.height == 0.0));
        assert!(vis.simulator().is_running());
    }

    #[test]
    fn spectrum_and_field_share_one_frame() {
        let backend = OfflineBackend::new();
        let mut vis = visualizer(&backend);
        vis.load_decoded(silent_clip()).unwrap();
        vis.play().unwrap();
        vis.frame(DT).unwrap();
        let out = vis.frame(DT).unwrap();
        assert_eq!(out.spectrum.unwrap().timestamp, out.frame.timestamp());
        assert!((out.position - 2.0 * DT).abs() < 1e-9);
    }

    #[test]
    fn paused_seek_then_play() {
        let backend = OfflineBackend::new();
        let mut vis = visualizer(&backend);
        vis.load_decoded(silent_clip()).unwrap();
        vis.play().unwrap();
        vis.frame(DT);

        vis.pause();
        vis.seek(1.0).unwrap();
        vis.play().unwrap();
        assert_eq!(vis.state(), PlaybackState::Playing);
        assert_eq!(vis.position(), 1.0);
        assert!(backend.stats().max_live_nodes <= 1);
    }

    #[test]
    fn idle_field_before_play() {
        let backend = OfflineBackend::new();
        let mut vis = visualizer(&backend);
        vis.load_decoded(silent_clip()).unwrap();

        let out = vis.frame(DT).unwrap();
        assert_eq!(out.state, PlaybackState::Ready);
        assert!(out.spectrum.is_none());
        assert_eq!(out.sprites.len(), 600);
    }

    #[test]
    fn clear_stops_the_frame_loop() {
        let backend = OfflineBackend::new();
        let mut vis = visualizer(&backend);
        assert!(vis.frame(DT).is_none());

        vis.load_decoded(silent_clip()).unwrap();
        vis.play().unwrap();
        assert!(vis.frame(DT).is_some());

        vis.clear();
        assert!(vis.frame(DT).is_none());
        assert_eq!(vis.state(), PlaybackState::Idle);
        assert_eq!(backend.stats().graphs_closed, 1);
        assert_eq!(backend.stats().live_nodes, 0);
        vis.clear();
        assert_eq!(backend.stats().graphs_closed, 1);
    }

    #[test]
    fn playback_finishes_into_paused() {
        let backend = OfflineBackend::new();
        let mut vis = visualizer(&backend);
        vis.load_decoded(Arc::new(DecodedAudio::silent(8000, 1, 0.05))).unwrap();
        vis.play().unwrap();
        for _ in 0..10 {
            vis.frame(DT);
        }
        assert_eq!(vis.state(), PlaybackState::Paused);
        assert_eq!(vis.position(), vis.duration());
        assert!(!vis.simulator().is_running());
    }

    #[test]
    fn rejects_non_audio_uploads() {
        let backend = OfflineBackend::new();
        let mut vis = visualizer(&backend);
        let err = vis
            .load(b"%PDF-1.7".to_vec(), "paper.pdf", Some("application/pdf"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Decode(DecodeError::Unsupported(_))));
        assert_eq!(vis.state(), PlaybackState::Error);
        assert!(vis.error_banner().is_some());
        assert!(!vis.is_loading());

        vis.clear();
        assert!(vis.error_banner().is_none());
    }

    fn wait_for_decode(vis: &mut Visualizer) -> Result<(), EngineError> {
        for _ in 0..500 {
            if let Some(result) = vis.poll_decode() {
                return result;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("decode never completed");
    }

    #[test]
    fn background_load_reaches_ready() {
        let backend = OfflineBackend::new();
        let mut vis = visualizer(&backend);
        let bytes = encode_wav(&DecodedAudio::silent(22050, 2, 0.5)).unwrap();

        vis.load(bytes, "tone.wav", Some("audio/wav")).unwrap();
        assert_eq!(vis.state(), PlaybackState::Loading);
        assert!(vis.frame(DT).is_none());

        wait_for_decode(&mut vis).unwrap();
        assert_eq!(vis.state(), PlaybackState::Ready);
        assert!((vis.duration() - 0.5).abs() < 1e-3);
        assert_eq!(vis.file_name(), Some("tone.wav"));
        assert!(vis.frame(DT).is_some());
    }

    #[test]
    fn failed_decode_sets_banner() {
        let backend = OfflineBackend::new();
        let mut vis = visualizer(&backend);
        vis.load(vec![0x13; 512], "noise.mp3", Some("audio/mpeg")).unwrap();

        assert!(wait_for_decode(&mut vis).is_err());
        assert_eq!(vis.state(), PlaybackState::Error);
        assert!(vis.error_banner().is_some());
        assert!(vis.frame(DT).is_none());
    }

    #[test]
    fn pattern_commands_reach_the_field() {
        let backend = OfflineBackend::new();
        let mut vis = visualizer(&backend);
        vis.set_pattern_variant(PatternVariant::Circle);
        vis.set_complexity(1);
        assert_eq!(vis.pattern(), PatternConfig::new(PatternVariant::Circle, 2));
    }

    #[test]
    fn resize_reaches_both_views() {
        let backend = OfflineBackend::new();
        let mut vis = visualizer(&backend);
        vis.load_decoded(silent_clip()).unwrap();
        vis.play().unwrap();
        vis.resize((100, 50), (80, 40));

        let out = vis.frame(DT).unwrap();
        assert!(out
            .sprites
            .iter()
            .all(|s| (0.0..=100.0).contains(&s.x) && (0.0..=50.0).contains(&s.y)));
        let spectrum = out.spectrum.unwrap();
        assert_eq!(spectrum.high, layout_band(out.frame, Band::High, 80.0, 40.0));
        assert_eq!(vis.simulator().state().width, 100.0);
    }
}
