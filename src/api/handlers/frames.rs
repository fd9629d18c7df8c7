use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::api::models::*;
use crate::service::SharedState;

/// GET /tags - Display names of the recorded channels
pub async fn get_tags(State(state): State<SharedState>) -> Json<TagsResponse> {
    Json(TagsResponse {
        tags: state.recorder.tag_names().to_vec(),
    })
}

/// GET /frames/latest - Most recently delivered frame
pub async fn get_latest_frame(
    State(state): State<SharedState>,
) -> Result<Json<LatestFrameResponse>, (StatusCode, Json<ErrorResponse>)> {
    let frames = state.frames.read().await;

    let Some(record) = frames.latest_frame.as_ref() else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no frame recorded yet".to_string(),
            }),
        ));
    };

    let frame = record.frame().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    Ok(Json(LatestFrameResponse {
        source: record.source.clone(),
        timestamp_millis: record.timestamp_millis,
        frame,
    }))
}
