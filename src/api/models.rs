use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::{ErrorKind, RecorderError};
use crate::recorder::SessionState;
use crate::recorder::frame::Frame;

// ============= Tag Endpoints =============

#[derive(Debug, Serialize)]
pub struct TagsResponse {
    pub tags: Vec<String>,
}

// ============= Recording Endpoints =============

#[derive(Debug, Serialize)]
pub struct RecordingResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub source: String,
    pub state: SessionState,
    pub frames_received: u64,
    pub sessions_started: u64,
}

#[derive(Debug, Serialize)]
pub struct LatestFrameResponse {
    pub source: String,
    pub timestamp_millis: i64,
    pub frame: Frame,
}

// ============= Error Response =============

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for RecorderError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::Configuration => StatusCode::BAD_REQUEST,
            ErrorKind::Resolution | ErrorKind::Device => StatusCode::BAD_GATEWAY,
            ErrorKind::Serialization | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Lifecycle misuse is the caller's problem, not worth a log line
        if status != StatusCode::CONFLICT {
            tracing::error!("Request failed: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
