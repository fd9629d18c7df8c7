use axum::Router;
use axum::routing::{get, post};

use super::handlers::{frames, recording};
use crate::service::SharedState;

/// Create the API router with all endpoints
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // Introspection
        .route("/tags", get(frames::get_tags))
        .route("/status", get(recording::get_status))
        .route("/frames/latest", get(frames::get_latest_frame))
        // Recording control
        .route("/record/start", post(recording::start_record))
        .route("/record/stop", post(recording::stop_record))
        // Add state to all routes
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::handlers::testing::test_state;

    #[tokio::test]
    async fn test_tags_route() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/tags").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stop_before_start_conflicts() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/record/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_double_start_conflicts() {
        let state = test_state();
        let app = create_router(state.clone());

        let start = || {
            Request::builder()
                .method("POST")
                .uri("/record/start")
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(start()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(start()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        state.recorder.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_latest_frame_not_found() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/frames/latest")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
