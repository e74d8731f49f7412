//! Object key layout and metadata document decoding.
//!
//! Metadata lives at `video-metadata/{id}.json`, summaries at
//! `summaries/{id}.md`. The id is always the filename stem of the key.

use crate::models::video::VideoMetadata;
use serde_json::Value;
use thiserror::Error;

pub const METADATA_PREFIX: &str = "video-metadata/";
pub const METADATA_SUFFIX: &str = ".json";
pub const SUMMARY_PREFIX: &str = "summaries/";
pub const SUMMARY_SUFFIX: &str = ".md";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("malformed metadata document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("metadata document is not a JSON object")]
    NotAnObject,
}

pub fn metadata_key(video_id: &str) -> String {
    format!("{METADATA_PREFIX}{video_id}{METADATA_SUFFIX}")
}

pub fn summary_key(video_id: &str) -> String {
    format!("{SUMMARY_PREFIX}{video_id}{SUMMARY_SUFFIX}")
}

/// Derive the video id from a metadata object key.
///
/// Only direct children of [`METADATA_PREFIX`] map to an id, since those are
/// the only keys [`metadata_key`] can produce. Returns `None` for nested keys,
/// keys without the metadata suffix and empty stems.
pub fn video_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(METADATA_PREFIX)
        .filter(|filename| !filename.contains('/'))
        .and_then(|filename| filename.strip_suffix(METADATA_SUFFIX))
        .filter(|stem| !stem.is_empty())
}

/// Decode one metadata object and tag it with `video_id`.
///
/// Only the shape is checked: the body must be a JSON object. A stored `id`
/// field is replaced by the derived one.
pub fn parse_metadata(video_id: &str, bytes: &[u8]) -> Result<VideoMetadata, MetadataError> {
    let Value::Object(mut fields) = serde_json::from_slice::<Value>(bytes)? else {
        return Err(MetadataError::NotAnObject);
    };
    fields.shift_remove("id");

    Ok(VideoMetadata {
        fields,
        id: video_id.to_string(),
    })
}
