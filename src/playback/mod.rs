pub mod backend;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::audio::analyser::{AnalyserSettings, AnalysisFrame, AnalysisTap};
use crate::audio::decode::DecodedAudio;
use backend::{AudioBackend, AudioGraph, OutputNode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    /// Output stopped for a position change; restarts once settled.
    Seeking,
    Error,
}

impl PlaybackState {
    pub fn has_session(self) -> bool {
        matches!(
            self,
            PlaybackState::Ready
                | PlaybackState::Playing
                | PlaybackState::Paused
                | PlaybackState::Seeking
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Seeking => "seeking",
            PlaybackState::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    #[error("could not create audio graph: {0}")]
    GraphCreationFailed(String),
    #[error("cannot seek to {0:.3}s without a loaded session")]
    InvalidSeekTarget(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackSettings {
    /// Pass-through gain after the analyser
    pub gain: f32,
    /// Delay between stopping output and restarting it after a seek (seconds)
    pub settle_secs: f64,
    pub analyser: AnalyserSettings,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            gain: 0.01,
            settle_secs: 0.1,
            analyser: AnalyserSettings::default(),
        }
    }
}

struct Session {
    audio: Arc<DecodedAudio>,
    graph: Box<dyn AudioGraph>,
    output: Option<Box<dyn OutputNode>>,
    /// Stopped nodes waiting for confirmation before a restart may begin
    retired: Vec<Box<dyn OutputNode>>,
    tap: AnalysisTap,
    position: f64,
}

impl Session {
    fn duration(&self) -> f64 {
        self.audio.duration()
    }

    fn stop_output(&mut self) {
        if let Some(mut node) = self.output.take() {
            if let Err(err) = node.stop() {
                log::debug!("Ignoring output stop failure: {}", err);
            }
            if !node.is_stopped() {
                self.retired.push(node);
            }
        }
    }

    /// Drops retired nodes that confirmed they are silent. True when none
    /// are left sounding.
    fn reap_retired(&mut self) -> bool {
        self.retired.retain(|node| !node.is_stopped());
        self.retired.is_empty()
    }

    fn release(mut self) {
        self.stop_output();
        if !self.retired.is_empty() {
            log::debug!("Releasing {} unconfirmed output node(s)", self.retired.len());
            self.retired.clear();
        }
        if self.graph.is_closed() {
            return;
        }
        if let Err(err) = self.graph.close() {
            log::debug!("Ignoring audio graph close failure: {}", err);
        }
    }
}

/// Owns the single playback session for the loaded audio.
///
/// Every host event (play button, waveform click, seek drag, end of track) is
/// a method call here, and all of them run to completion on the caller's
/// thread. Seek restarts are deferred to [`tick`](Self::tick) so the old
/// output has stopped before a new one starts.
pub struct PlaybackController {
    backend: Box<dyn AudioBackend>,
    settings: PlaybackSettings,
    state: PlaybackState,
    session: Option<Session>,
    settle_remaining: f64,
    last_error: Option<String>,
}

impl PlaybackController {
    pub fn new(backend: Box<dyn AudioBackend>, settings: PlaybackSettings) -> Self {
        Self {
            backend,
            settings,
            state: PlaybackState::Idle,
            session: None,
            settle_remaining: 0.0,
            last_error: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn position(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.position)
    }

    pub fn duration(&self) -> f64 {
        self.session.as_ref().map_or(0.0, Session::duration)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.audio.sample_rate())
    }

    pub fn audio(&self) -> Option<&Arc<DecodedAudio>> {
        self.session.as_ref().map(|s| &s.audio)
    }

    pub fn analysis_tap(&self) -> Option<&AnalysisTap> {
        self.session.as_ref().map(|s| &s.tap)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn begin_loading(&mut self) {
        self.teardown();
        self.last_error = None;
        self.transition(PlaybackState::Loading);
    }

    /// Enter the terminal error state until the next load or clear.
    pub fn fail(&mut self, message: impl fmt::Display) {
        self.teardown();
        let message = message.to_string();
        log::error!("Playback error: {}", message);
        self.last_error = Some(message);
        self.transition(PlaybackState::Error);
    }

    pub fn load(&mut self, audio: Arc<DecodedAudio>) -> Result<(), PlaybackError> {
        self.teardown();

        let graph = match self
            .backend
            .create_graph(audio.sample_rate(), audio.channel_count())
        {
            Ok(graph) => graph,
            Err(err) => {
                let err = PlaybackError::GraphCreationFailed(err.to_string());
                self.fail(&err);
                return Err(err);
            }
        };

        log::info!(
            "Session ready: {:.2}s, {}Hz, {} channel(s)",
            audio.duration(),
            audio.sample_rate(),
            audio.channel_count()
        );

        let tap = AnalysisTap::new(self.settings.analyser, audio.sample_rate());
        self.session = Some(Session {
            audio,
            graph,
            output: None,
            retired: Vec::new(),
            tap,
            position: 0.0,
        });
        self.last_error = None;
        self.transition(PlaybackState::Ready);
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            PlaybackState::Ready | PlaybackState::Paused => {
                let silent = match self.session.as_mut() {
                    Some(session) => {
                        if session.position >= session.duration() {
                            session.position = 0.0;
                        }
                        session.reap_retired()
                    }
                    None => true,
                };
                if silent {
                    self.start_output()?;
                    self.transition(PlaybackState::Playing);
                } else {
                    // A node stopped by an earlier seek or pause is still
                    // sounding; tick restarts once it confirms.
                    self.settle_remaining = 0.0;
                    self.transition(PlaybackState::Seeking);
                }
                Ok(())
            }
            // The pending restart already resumes playback
            PlaybackState::Seeking | PlaybackState::Playing => Ok(()),
            state => {
                log::debug!("Ignoring play while {}", state);
                Ok(())
            }
        }
    }

    pub fn pause(&mut self) {
        match self.state {
            PlaybackState::Playing => {
                if let Some(session) = self.session.as_mut() {
                    session.stop_output();
                }
                self.transition(PlaybackState::Paused);
            }
            PlaybackState::Seeking => {
                self.settle_remaining = 0.0;
                self.transition(PlaybackState::Paused);
            }
            state => log::debug!("Ignoring pause while {}", state),
        }
    }

    pub fn toggle(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            PlaybackState::Playing | PlaybackState::Seeking => {
                self.pause();
                Ok(())
            }
            _ => self.play(),
        }
    }

    /// Move to `target` seconds, clamped into the asset.
    ///
    /// While playing, output stops now and restarts from `tick` after the
    /// settle delay. A seek that lands during that window only moves the
    /// target; it never schedules a second restart.
    pub fn seek(&mut self, target: f64) -> Result<(), PlaybackError> {
        let settle = self.settings.settle_secs.max(0.0);
        let state = self.state;
        let session = match self.session.as_mut() {
            Some(session) if state.has_session() => session,
            _ => return Err(PlaybackError::InvalidSeekTarget(target)),
        };

        let position = clamp_position(target, session.duration());
        session.position = position;
        let at_end = position >= session.duration();

        match state {
            PlaybackState::Playing | PlaybackState::Seeking if at_end => {
                session.stop_output();
                self.settle_remaining = 0.0;
                log::info!("Playback finished");
                self.transition(PlaybackState::Paused);
            }
            PlaybackState::Playing => {
                session.stop_output();
                self.settle_remaining = settle;
                self.transition(PlaybackState::Seeking);
            }
            PlaybackState::Seeking => {
                self.settle_remaining = settle;
            }
            _ => {}
        }
        log::debug!("Seek to {:.3}s ({})", position, self.state);
        Ok(())
    }

    /// Advance the playback clock by `dt` seconds.
    pub fn tick(&mut self, dt: f64) -> Result<(), PlaybackError> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        match self.state {
            PlaybackState::Playing => {
                let finished = match self.session.as_mut() {
                    Some(session) => {
                        session.position += dt;
                        if session.position >= session.duration() {
                            session.position = session.duration();
                            session.stop_output();
                            true
                        } else {
                            false
                        }
                    }
                    None => false,
                };
                if finished {
                    log::info!("Playback finished");
                    self.transition(PlaybackState::Paused);
                }
            }
            PlaybackState::Seeking => {
                self.settle_remaining -= dt;
                let stopped = self.session.as_mut().map_or(true, Session::reap_retired);
                if self.settle_remaining <= 0.0 && stopped {
                    self.settle_remaining = 0.0;
                    self.start_output()?;
                    self.transition(PlaybackState::Playing);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Stop everything and release the audio graph. Safe to repeat.
    pub fn clear(&mut self) {
        self.teardown();
        self.last_error = None;
        if self.state != PlaybackState::Idle {
            self.transition(PlaybackState::Idle);
        }
    }

    /// Read the analysis tap at the current position. Only a playing
    /// session advances the tap; otherwise `frame` keeps its last contents.
    pub fn capture_frame(&mut self, frame: &mut AnalysisFrame) -> bool {
        let playing = self.is_playing();
        match self.session.as_mut() {
            Some(session) => {
                if playing {
                    let Session {
                        audio, tap, position, ..
                    } = session;
                    tap.capture(audio, *position, frame);
                }
                true
            }
            None => false,
        }
    }

    fn start_output(&mut self) -> Result<(), PlaybackError> {
        let gain = self.settings.gain;
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        session.stop_output();

        let offset = safe_offset(session.position, session.duration());
        match session
            .graph
            .start_output(Arc::clone(&session.audio), offset, gain)
        {
            Ok(node) => {
                log::debug!("Output started at {:.3}s", node.offset());
                session.tap.reset();
                session.output = Some(node);
                Ok(())
            }
            Err(err) => {
                let err = PlaybackError::GraphCreationFailed(err.to_string());
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn teardown(&mut self) {
        self.settle_remaining = 0.0;
        if let Some(session) = self.session.take() {
            log::debug!("Releasing playback session");
            session.release();
        }
    }

    fn transition(&mut self, next: PlaybackState) {
        if self.state != next {
            log::debug!("Playback {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Clamp a requested position into `[0, duration]`; non-finite input maps to 0.
pub fn clamp_position(target: f64, duration: f64) -> f64 {
    if !target.is_finite() || !duration.is_finite() || duration <= 0.0 {
        return 0.0;
    }
    target.clamp(0.0, duration)
}

/// Start offset for an output node. Anything outside `[0, duration)` starts
/// from the beginning.
pub fn safe_offset(position: f64, duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 && position.is_finite() && (0.0..duration).contains(&position) {
        position
    } else {
        0.0
    }
}

/// `m:ss` clock text.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0) as u64 } else { 0 };
    format!("{}:{:02}", total / 60, total % 60)
}
