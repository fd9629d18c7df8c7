pub mod frame;
mod session;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc};
use tokio::task::JoinHandle;

use crate::device::DeviceController;
use crate::error::{DeviceError, RecorderError, SinkError};
use crate::sink::{PointWriter, SinkBinding};
use frame::FrameRecord;
use session::{Session, run_blocking, spawn_on_device};

/// Receiving end of a recording session's frame stream
pub type FrameReceiver = mpsc::Receiver<FrameRecord>;

/// Tunables for the recording engine
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Source name stamped on every delivered record
    pub source_name: String,
    pub poll_interval: Duration,
    /// Pause between session start and the first tick
    pub warmup_delay: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            source_name: "daq-recorder".to_string(),
            poll_interval: Duration::from_secs(5),
            warmup_delay: Duration::from_secs(1),
        }
    }
}

/// Lifecycle of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Recording = 1,
    /// Stop requested, background loop still draining
    Stopping = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Recording,
            2 => SessionState::Stopping,
            _ => SessionState::Idle,
        }
    }
}

/// Session state shared with the background loop.
///
/// Exactly one party owns the return to [`SessionState::Idle`] at a time:
/// a running session task, or a start that has not handed one over yet.
#[derive(Debug)]
struct Lifecycle {
    state: AtomicU8,
    released: Notify,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Idle as u8),
            released: Notify::new(),
        }
    }

    fn load(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: SessionState, to: SessionState) -> Result<(), SessionState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(SessionState::from_u8)
    }

    /// Back to idle, waking everyone waiting for it
    fn release(&self) {
        self.state.store(SessionState::Idle as u8, Ordering::SeqCst);
        self.released.notify_waiters();
    }
}

struct SessionHandle {
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Close the stop channel and wait for the loop to exit
    async fn join(self) -> Result<(), RecorderError> {
        let SessionHandle { stop_tx, task } = self;
        drop(stop_tx);
        task.await?;
        Ok(())
    }
}

/// Rolls back a claimed start that never handed over a running session.
///
/// Covers both failure and cancellation of the start future.
struct StartGuard<'a> {
    lifecycle: &'a Arc<Lifecycle>,
    device: &'a Arc<Mutex<DeviceController>>,
    /// Scan start that was in flight when the guard fired
    scan_start: Option<JoinHandle<Result<(), DeviceError>>>,
    armed: bool,
}

impl<'a> StartGuard<'a> {
    fn new(lifecycle: &'a Arc<Lifecycle>, device: &'a Arc<Mutex<DeviceController>>) -> Self {
        Self {
            lifecycle,
            device,
            scan_start: None,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Some(pending) = self.scan_start.take() else {
            self.lifecycle.release();
            return;
        };

        // Scanning may still be switched on: turn it off before releasing
        let lifecycle = self.lifecycle.clone();
        let device = self.device.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Ok(Ok(())) = pending.await {
                        match run_blocking(&device, DeviceController::stop_scanning).await {
                            Ok(Ok(())) => tracing::info!("Scanning stopped after abandoned start"),
                            Ok(Err(e)) => tracing::error!("Failed to stop scanning: {}", e),
                            Err(e) => tracing::error!("Failed to stop scanning: {}", e),
                        }
                    }
                    lifecycle.release();
                });
            }
            Err(_) => lifecycle.release(),
        }
    }
}

/// Polls the device on a fixed interval and streams frames while recording
pub struct Recorder {
    config: RecorderConfig,
    sink: Option<SinkBinding>,
    device: Arc<Mutex<DeviceController>>,
    tag_names: Vec<String>,
    lifecycle: Arc<Lifecycle>,
    session: AsyncMutex<Option<SessionHandle>>,
}

impl Recorder {
    pub fn new(config: RecorderConfig, device: DeviceController, sink: Option<SinkBinding>) -> Self {
        let tag_names = device.tag_names();

        Self {
            config,
            sink,
            device: Arc::new(Mutex::new(device)),
            tag_names,
            lifecycle: Arc::new(Lifecycle::new()),
            session: AsyncMutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.load()
    }

    /// Display names of the recorded channels, ascending by index
    pub fn tag_names(&self) -> &[String] {
        &self.tag_names
    }

    pub fn source_name(&self) -> &str {
        &self.config.source_name
    }

    /// Start a recording session and return its frame stream.
    ///
    /// The session is claimed before the device or sink is touched, so a
    /// concurrent caller is rejected with [`RecorderError::AlreadyRecording`]
    /// without side effects. If a previous session is still draining, this
    /// waits for it to finish. Dropping the returned future before it
    /// completes releases the claim.
    pub async fn start_record(&self) -> Result<FrameReceiver, RecorderError> {
        self.claim().await?;
        let mut guard = StartGuard::new(&self.lifecycle, &self.device);

        let mut slot = self.session.lock().await;
        if let Some(previous) = slot.take() {
            join_previous(previous).await;
        }

        let (session, frame_rx) = self.open_session(&mut guard).await?;

        // A stop requested while starting found no session to signal
        if self.lifecycle.load() == SessionState::Stopping {
            let _ = session.stop_tx.try_send(());
        }
        *slot = Some(session);
        guard.disarm();

        Ok(frame_rx)
    }

    /// Ask the running session to stop. Teardown happens in the background.
    pub async fn stop_record(&self) -> Result<(), RecorderError> {
        if self
            .lifecycle
            .transition(SessionState::Recording, SessionState::Stopping)
            .is_err()
        {
            return Err(RecorderError::AlreadyStoppedRecording);
        }

        let slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            // One signal per session and the channel holds one
            let _ = session.stop_tx.try_send(());
        }

        tracing::info!("Stop requested");
        Ok(())
    }

    /// Shut down: stop any session and wait until its loop has exited
    pub async fn stop(&self) -> Result<(), RecorderError> {
        let released = self.lifecycle.released.notified();
        tokio::pin!(released);
        released.as_mut().enable();

        let session = self.session.lock().await.take();
        match session {
            Some(session) => session.join().await?,
            None => {
                // A start is in flight, or another caller is joining the loop
                let pending = self
                    .lifecycle
                    .transition(SessionState::Recording, SessionState::Stopping)
                    .is_ok()
                    || self.lifecycle.load() == SessionState::Stopping;
                if pending {
                    released.await;
                }
            }
        }

        tracing::info!("Recorder stopped");
        Ok(())
    }

    /// Idle -> Recording, waiting out a draining session first
    async fn claim(&self) -> Result<(), RecorderError> {
        loop {
            let released = self.lifecycle.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            match self
                .lifecycle
                .transition(SessionState::Idle, SessionState::Recording)
            {
                Ok(()) => return Ok(()),
                Err(SessionState::Stopping) => {
                    // Join the draining loop unless another caller already took it
                    let previous = self.session.lock().await.take();
                    match previous {
                        Some(previous) => join_previous(previous).await,
                        None => released.await,
                    }
                }
                Err(_) => return Err(RecorderError::AlreadyRecording),
            }
        }
    }

    async fn open_session(
        &self,
        guard: &mut StartGuard<'_>,
    ) -> Result<(SessionHandle, FrameReceiver), RecorderError> {
        let writer = match &self.sink {
            Some(binding) => Some(open_writer(binding).await?),
            None => None,
        };

        let pending = guard
            .scan_start
            .insert(spawn_on_device(&self.device, DeviceController::start_scanning));
        let started = pending.await;
        guard.scan_start = None;

        let started = started
            .map_err(RecorderError::from)
            .and_then(|r| r.map_err(RecorderError::from));
        if let Err(e) = started {
            if let Some(writer) = writer {
                let _ = writer.close().await;
            }
            return Err(e);
        }

        let (frame_tx, frame_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let session = Session {
            source_name: self.config.source_name.clone(),
            poll_interval: self.config.poll_interval,
            warmup_delay: self.config.warmup_delay,
            device: self.device.clone(),
            writer,
            frame_tx,
            stop_rx,
            lifecycle: self.lifecycle.clone(),
        };
        let task = tokio::spawn(session.run());

        Ok((SessionHandle { stop_tx, task }, frame_rx))
    }
}

/// Wait for an earlier session's loop to exit. It releases the state itself.
async fn join_previous(previous: SessionHandle) {
    if let Err(e) = previous.join().await {
        tracing::warn!("Previous session ended abnormally: {}", e);
    }
}

/// Validate the sink destination and open a writer for it
async fn open_writer(binding: &SinkBinding) -> Result<Box<dyn PointWriter>, RecorderError> {
    if binding.org.trim().is_empty() || binding.bucket.trim().is_empty() {
        return Err(RecorderError::Config(
            "sink organization or bucket cannot be blank".into(),
        ));
    }

    let org = binding
        .client
        .find_org(&binding.org)
        .await
        .map_err(|e| RecorderError::InvalidOrganization(format!("{}: {}", binding.org, e)))?;

    let bucket = binding
        .client
        .find_or_create_bucket(&org, &binding.bucket)
        .await
        .map_err(|e| match e {
            SinkError::BucketCreation(_) => RecorderError::Sink(e),
            other => RecorderError::InvalidBucket(format!("{}: {}", binding.bucket, other)),
        })?;

    Ok(binding.client.writer(&org, &bucket))
}
