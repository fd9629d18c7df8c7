use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};

use super::Lifecycle;
use super::frame::{Frame, FrameRecord};
use crate::device::DeviceController;
use crate::error::RecorderError;
use crate::sink::{Point, PointWriter};

/// Start a blocking device operation on the blocking pool
pub(super) fn spawn_on_device<R, F>(device: &Arc<Mutex<DeviceController>>, op: F) -> JoinHandle<R>
where
    F: FnOnce(&mut DeviceController) -> R + Send + 'static,
    R: Send + 'static,
{
    let device = device.clone();
    tokio::task::spawn_blocking(move || {
        let mut device = device.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut device)
    })
}

/// Run a blocking device operation on the blocking pool and wait for it
pub(super) async fn run_blocking<R, F>(
    device: &Arc<Mutex<DeviceController>>,
    op: F,
) -> Result<R, RecorderError>
where
    F: FnOnce(&mut DeviceController) -> R + Send + 'static,
    R: Send + 'static,
{
    Ok(spawn_on_device(device, op).await?)
}

/// Returns the recorder to idle when the session task ends, panics included
struct ReleaseOnExit(Arc<Lifecycle>);

impl Drop for ReleaseOnExit {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Why a sampling loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    Stopped,
    ReceiverDropped,
    Failed,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Stopped => write!(f, "stop requested"),
            EndReason::ReceiverDropped => write!(f, "frame receiver dropped"),
            EndReason::Failed => write!(f, "sampling failed"),
        }
    }
}

/// Everything one recording session's background task owns
pub(super) struct Session {
    pub(super) source_name: String,
    pub(super) poll_interval: Duration,
    pub(super) warmup_delay: Duration,
    pub(super) device: Arc<Mutex<DeviceController>>,
    pub(super) writer: Option<Box<dyn PointWriter>>,
    pub(super) frame_tx: mpsc::Sender<FrameRecord>,
    pub(super) stop_rx: mpsc::Receiver<()>,
    pub(super) lifecycle: Arc<Lifecycle>,
}

impl Session {
    /// Sample until told to stop, then tear the session down
    pub(super) async fn run(mut self) {
        let _release = ReleaseOnExit(self.lifecycle.clone());

        tracing::info!(
            "Recording started: interval={:?}, sink={}",
            self.poll_interval,
            self.writer.is_some()
        );

        let reason = self.sample().await;
        tracing::info!("Recording session ending: {}", reason);

        self.teardown().await;
    }

    async fn sample(&mut self) -> EndReason {
        // Let the consumer attach before the first frame
        tokio::select! {
            biased;
            _ = self.stop_rx.recv() => return EndReason::Stopped,
            _ = sleep(self.warmup_delay) => {}
        }

        let period = self.poll_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // A closed stop channel counts as a stop signal
            tokio::select! {
                biased;
                _ = self.stop_rx.recv() => return EndReason::Stopped,
                _ = ticker.tick() => {}
            }

            let record = match self.sample_once().await {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!("{}", e);
                    return EndReason::Failed;
                }
            };

            tokio::select! {
                biased;
                _ = self.stop_rx.recv() => return EndReason::Stopped,
                sent = self.frame_tx.send(record) => {
                    if sent.is_err() {
                        return EndReason::ReceiverDropped;
                    }
                }
            }
        }
    }

    /// Read every channel once and build the delivery record
    async fn sample_once(&mut self) -> Result<FrameRecord, RecorderError> {
        let readings = run_blocking(&self.device, DeviceController::read_all).await?;
        let now = Utc::now();

        let frame = Frame::from_readings(&readings);

        if let Some(writer) = self.writer.as_mut() {
            for reading in readings.iter().filter(|r| r.forwards_to_sink()) {
                if let Some(value) = reading.value.as_f64() {
                    writer.write(Point::reading(
                        &reading.semantic_type,
                        &reading.display_name,
                        value,
                        now,
                    ));
                }
            }
        }

        let payload = frame.to_json()?;
        tracing::debug!("Frame with {} values ({} bytes)", frame.data.len(), payload.len());

        Ok(FrameRecord::new(&self.source_name, now, payload))
    }

    /// Best-effort shutdown: every step runs even if an earlier one failed
    async fn teardown(mut self) {
        match run_blocking(&self.device, DeviceController::stop_scanning).await {
            Ok(Ok(())) => tracing::info!("Device scanning stopped"),
            Ok(Err(e)) => tracing::error!("Failed to stop scanning: {}", e),
            Err(e) => tracing::error!("Failed to stop scanning: {}", e),
        }

        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush().await {
                tracing::error!("Sink flush failed: {}", e);
            }
            if let Err(e) = writer.close().await {
                tracing::error!("Sink close failed: {}", e);
            }
        }

        drop(self.frame_tx);
        tracing::info!("Recording stopped");
    }
}
