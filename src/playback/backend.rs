use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;

use crate::audio::decode::DecodedAudio;

/// Highest channel count an audio graph accepts.
pub const MAX_GRAPH_CHANNELS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("audio subsystem unavailable: {0}")]
    Unavailable(String),
    #[error("audio resource already released")]
    AlreadyReleased,
}

pub trait AudioBackend {
    fn create_graph(
        &mut self,
        sample_rate: u32,
        channels: usize,
    ) -> Result<Box<dyn AudioGraph>, BackendError>;
}

pub trait AudioGraph {
    /// Start a new output node playing `audio` from `offset` seconds. The
    /// analyser sits before `gain`, so analysis sees the unattenuated signal.
    fn start_output(
        &mut self,
        audio: Arc<DecodedAudio>,
        offset: f64,
        gain: f32,
    ) -> Result<Box<dyn OutputNode>, BackendError>;

    /// Release the graph. A second close reports `AlreadyReleased`.
    fn close(&mut self) -> Result<(), BackendError>;

    fn is_closed(&self) -> bool;
}

/// Single-shot: a stopped node never starts again.
pub trait OutputNode {
    /// Stop output. A second stop reports `AlreadyReleased`.
    fn stop(&mut self) -> Result<(), BackendError>;

    /// True once the node has confirmed it produces no more output.
    fn is_stopped(&self) -> bool;

    fn offset(&self) -> f64;
}

/// Node bookkeeping shared by an [`OfflineBackend`] and everything it creates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutputStats {
    pub graphs_created: usize,
    pub graphs_closed: usize,
    pub nodes_started: usize,
    pub nodes_stopped: usize,
    pub live_nodes: usize,
    pub max_live_nodes: usize,
}

/// Virtual-clock backend: nothing reaches a sound card, the controller's
/// `tick` is the only clock. Used by the offline renderer and tests.
#[derive(Clone, Default)]
pub struct OfflineBackend {
    stats: Rc<RefCell<OutputStats>>,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> OutputStats {
        *self.stats.borrow()
    }
}

impl AudioBackend for OfflineBackend {
    fn create_graph(
        &mut self,
        sample_rate: u32,
        channels: usize,
    ) -> Result<Box<dyn AudioGraph>, BackendError> {
        if sample_rate == 0 {
            return Err(BackendError::Unavailable("sample rate must be non-zero".into()));
        }
        if channels == 0 || channels > MAX_GRAPH_CHANNELS {
            return Err(BackendError::Unavailable(format!(
                "unsupported channel count {} (1-{})",
                channels, MAX_GRAPH_CHANNELS
            )));
        }
        self.stats.borrow_mut().graphs_created += 1;
        Ok(Box::new(OfflineGraph {
            closed: false,
            stats: Rc::clone(&self.stats),
        }))
    }
}

struct OfflineGraph {
    closed: bool,
    stats: Rc<RefCell<OutputStats>>,
}

impl AudioGraph for OfflineGraph {
    fn start_output(
        &mut self,
        _audio: Arc<DecodedAudio>,
        offset: f64,
        _gain: f32,
    ) -> Result<Box<dyn OutputNode>, BackendError> {
        if self.closed {
            return Err(BackendError::Unavailable("audio graph is closed".into()));
        }
        let mut stats = self.stats.borrow_mut();
        stats.nodes_started += 1;
        stats.live_nodes += 1;
        stats.max_live_nodes = stats.max_live_nodes.max(stats.live_nodes);
        Ok(Box::new(OfflineNode {
            offset,
            stopped: false,
            stats: Rc::clone(&self.stats),
        }))
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::AlreadyReleased);
        }
        self.closed = true;
        self.stats.borrow_mut().graphs_closed += 1;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

struct OfflineNode {
    offset: f64,
    stopped: bool,
    stats: Rc<RefCell<OutputStats>>,
}

impl OutputNode for OfflineNode {
    fn stop(&mut self) -> Result<(), BackendError> {
        if self.stopped {
            return Err(BackendError::AlreadyReleased);
        }
        self.stopped = true;
        let mut stats = self.stats.borrow_mut();
        stats.nodes_stopped += 1;
        stats.live_nodes -= 1;
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn offset(&self) -> f64 {
        self.offset
    }
}

impl Drop for OfflineNode {
    fn drop(&mut self) {
        if !self.stopped {
            let _ = self.stop();
        }
    }
}
