//! Represents a video's metadata document and the single-item lookup result.

use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A parsed metadata document, tagged with the id derived from its object key.
///
/// Apart from `id`, every field is optional and kept exactly as stored
/// (title, uploader, upload_date, duration, description, ...).
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    /// Stored fields in their original order. Never contains `id`.
    #[serde(flatten)]
    pub fields: Map<String, Value>,

    /// Filename stem of the object key this record was parsed from.
    pub id: String,
}

impl VideoMetadata {
    /// The `YYYYMMDD` upload date, when stored as a string.
    pub fn upload_date(&self) -> Option<&str> {
        self.fields.get("upload_date").and_then(Value::as_str)
    }

    /// Listing order: newest `upload_date` first, undated records last,
    /// ties broken by ascending id.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.upload_date()
            .cmp(&a.upload_date())
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Response body for a single video lookup.
#[derive(Serialize, Clone, Debug)]
pub struct VideoDetails {
    pub metadata: VideoMetadata,
    pub summary: String,
    pub is_archived: bool,
}
