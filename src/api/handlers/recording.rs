use axum::Json;
use axum::extract::State;

use crate::api::models::*;
use crate::error::RecorderError;
use crate::service::SharedState;
use crate::service::forwarder::FrameForwarder;

/// POST /record/start - Start a recording session
pub async fn start_record(
    State(state): State<SharedState>,
) -> Result<Json<RecordingResponse>, RecorderError> {
    let frame_rx = state.recorder.start_record().await?;

    state.frames.write().await.sessions_started += 1;

    let forwarder = FrameForwarder::new(state.frames.clone());
    tokio::spawn(async move { forwarder.run(frame_rx).await });

    tracing::info!("Recording started via API");

    Ok(Json(RecordingResponse {
        status: "recording".to_string(),
    }))
}

/// POST /record/stop - Request the session to stop
pub async fn stop_record(
    State(state): State<SharedState>,
) -> Result<Json<RecordingResponse>, RecorderError> {
    state.recorder.stop_record().await?;

    tracing::info!("Recording stop requested via API");

    Ok(Json(RecordingResponse {
        status: "stopping".to_string(),
    }))
}

/// GET /status - Session state and frame counters
pub async fn get_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let frames = state.frames.read().await;

    Json(StatusResponse {
        source: state.recorder.source_name().to_string(),
        state: state.recorder.state(),
        frames_received: frames.frames_received,
        sessions_started: frames.sessions_started,
    })
}
