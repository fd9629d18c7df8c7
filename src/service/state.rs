use std::sync::Arc;

use tokio::sync::RwLock;

use crate::recorder::Recorder;
use crate::recorder::frame::FrameRecord;

/// Frame bookkeeping exposed over HTTP
#[derive(Debug, Clone, Default)]
pub struct FrameState {
    pub latest_frame: Option<FrameRecord>,
    pub frames_received: u64,
    pub sessions_started: u64,
}

impl FrameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivered frame
    pub fn push(&mut self, record: FrameRecord) {
        self.frames_received += 1;
        self.latest_frame = Some(record);
    }
}

/// Application state shared by the HTTP handlers
#[derive(Clone)]
pub struct SharedState {
    pub recorder: Arc<Recorder>,
    pub frames: Arc<RwLock<FrameState>>,
}

/// Create a new shared state instance
pub fn create_shared_state(recorder: Recorder) -> SharedState {
    SharedState {
        recorder: Arc::new(recorder),
        frames: Arc::new(RwLock::new(FrameState::new())),
    }
}
