use std::sync::Arc;

use tokio::sync::RwLock;

use crate::recorder::FrameReceiver;
use crate::service::state::FrameState;

/// Consumes a session's frame stream on behalf of the HTTP surface
pub struct FrameForwarder {
    frames: Arc<RwLock<FrameState>>,
}

impl FrameForwarder {
    pub fn new(frames: Arc<RwLock<FrameState>>) -> Self {
        Self { frames }
    }

    /// Run until the session closes its stream
    pub async fn run(&self, mut frame_rx: FrameReceiver) {
        tracing::info!("Frame forwarder started");

        while let Some(record) = frame_rx.recv().await {
            tracing::debug!(
                "Frame from {} at {} ({} bytes)",
                record.source,
                record.timestamp_millis,
                record.payload.len()
            );

            let mut frames = self.frames.write().await;
            frames.push(record);
        }

        tracing::info!("Frame forwarder finished");
    }
}
