//! Defines the HTTP surface of the video summaries API.
//!
//! ## Structure
//! - `GET      /list-summaries` — every non-archived video's metadata, newest first
//! - `GET      /get-video`      — metadata, summary and archive flag for `video_id`
//! - `GET|POST /modify-video`   — archive or unarchive `video_id`
//! - `GET      /healthz`, `GET /readyz` — liveness and readiness
//!
//! Cross-origin requests are allowed from any origin.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        video_handlers::{get_video, list_summaries, modify_video},
    },
    services::video_service::VideoService,
};
use axum::{Router, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the router for all endpoints.
///
/// The router carries shared state (`VideoService`) to all handlers.
pub fn routes() -> Router<VideoService> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/list-summaries", get(list_summaries))
        .route("/get-video", get(get_video))
        .route("/modify-video", get(modify_video).post(modify_video))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
