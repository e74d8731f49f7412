//! HTTP handlers for the summary listing, single-video lookup and archive
//! toggling. Parameters arrive on the query string; validation and storage
//! live in `VideoService`.

use crate::{
    errors::AppError,
    models::video::{VideoDetails, VideoMetadata},
    services::video_service::VideoService,
};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

/// Query params accepted by the single-video endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct VideoQuery {
    pub video_id: Option<String>,
    pub action: Option<String>,
}

/// `GET /list-summaries`
pub async fn list_summaries(
    State(service): State<VideoService>,
) -> Result<Json<Vec<VideoMetadata>>, AppError> {
    Ok(Json(service.list_summaries().await?))
}

/// `GET /get-video?video_id=...`
pub async fn get_video(
    State(service): State<VideoService>,
    Query(q): Query<VideoQuery>,
) -> Result<Json<VideoDetails>, AppError> {
    let details = service.get_video(q.video_id.as_deref()).await?;
    Ok(Json(details))
}

/// `GET|POST /modify-video?video_id=...&action=archive|unarchive`
pub async fn modify_video(
    State(service): State<VideoService>,
    Query(q): Query<VideoQuery>,
) -> Result<String, AppError> {
    let confirmation = service
        .modify_video(q.video_id.as_deref(), q.action.as_deref())
        .await?;
    Ok(confirmation)
}
