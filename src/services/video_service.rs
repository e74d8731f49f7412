//! VideoService: the read/write operations behind the HTTP API.
//!
//! Store clients are built once in `main` and injected here; the service
//! itself holds no mutable state and is cheap to clone into every handler.
//! The summary listing lives in `summaries.rs`.

use crate::{
    models::{
        properties::ArchiveAction,
        video::{VideoDetails, VideoMetadata},
    },
    services::{
        flag_store::FlagStore,
        metadata::{MetadataError, metadata_key, parse_metadata, summary_key},
        object_store::ObjectStore,
    },
};
use bytes::Bytes;
use std::{fmt, future::Future, str::FromStr, sync::Arc, time::Duration};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const MAX_VIDEO_ID_LEN: usize = 512;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    MissingParameter(&'static str),
    #[error("Invalid video_id parameter")]
    InvalidVideoId(String),
    #[error("Invalid action parameter")]
    InvalidAction(String),
    #[error("Video metadata not found")]
    MetadataNotFound(String),
    #[error("Video summary not found")]
    SummaryNotFound(String),
    #[error("object `{key}` could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: MetadataError,
    },
    #[error("object store failure for `{key}`: {source:#}")]
    ObjectStore {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("flag store failure for `{video_id}`: {source:#}")]
    FlagStore {
        video_id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("request cancelled")]
    Cancelled,
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// What the summary listing does with a metadata object that fails to decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeFailurePolicy {
    /// Fail the whole listing.
    #[default]
    Abort,
    /// Drop the record, log a warning and return the rest.
    Skip,
}

impl FromStr for DecodeFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(format!(
                "unknown decode failure policy `{other}` (expected `abort` or `skip`)"
            )),
        }
    }
}

impl fmt::Display for DecodeFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("abort"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

/// Tunables for request handling.
#[derive(Clone, Debug)]
pub struct ServiceOptions {
    /// Upper bound on concurrent flag-check + download units per listing.
    pub max_concurrent_fetches: usize,
    /// Deadline for a whole listing or lookup.
    pub request_timeout: Duration,
    pub decode_failure: DecodeFailurePolicy,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 16,
            request_timeout: Duration::from_secs(30),
            decode_failure: DecodeFailurePolicy::Abort,
        }
    }
}

#[derive(Clone)]
pub struct VideoService {
    pub objects: Arc<dyn ObjectStore>,
    pub flags: Arc<dyn FlagStore>,
    pub(crate) options: ServiceOptions,
    /// Parent of every per-request token; cancelled on shutdown.
    pub(crate) shutdown: CancellationToken,
}

impl VideoService {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        flags: Arc<dyn FlagStore>,
        options: ServiceOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            objects,
            flags,
            options,
            shutdown,
        }
    }

    /// Resolve one video to its metadata, summary text and archive flag.
    ///
    /// Archived videos are still returned; only the listing hides them.
    pub async fn get_video(&self, video_id: Option<&str>) -> ServiceResult<VideoDetails> {
        let video_id =
            present(video_id).ok_or(ServiceError::MissingParameter("Missing video_id parameter"))?;
        validate_video_id(video_id)?;

        self.within_deadline(self.lookup(video_id)).await
    }

    async fn lookup(&self, video_id: &str) -> ServiceResult<VideoDetails> {
        let metadata_key = metadata_key(video_id);
        let summary_key = summary_key(video_id);

        let (metadata_exists, summary_exists) = futures::try_join!(
            self.object_exists(&metadata_key),
            self.object_exists(&summary_key)
        )?;

        if !metadata_exists {
            warn!("Video metadata not found for {} at {}", video_id, metadata_key);
            return Err(ServiceError::MetadataNotFound(video_id.to_string()));
        }
        if !summary_exists {
            warn!("Video summary not found for {} at {}", video_id, summary_key);
            return Err(ServiceError::SummaryNotFound(video_id.to_string()));
        }

        let (metadata_bytes, summary_bytes) = futures::try_join!(
            self.download_object(&metadata_key),
            self.download_object(&summary_key)
        )?;

        let metadata = self.decode(&metadata_key, video_id, &metadata_bytes)?;
        let summary = String::from_utf8_lossy(&summary_bytes).into_owned();
        let is_archived = self.is_archived(video_id).await?;

        Ok(VideoDetails {
            metadata,
            summary,
            is_archived,
        })
    }

    /// Validate and persist an archive/unarchive request.
    ///
    /// Idempotent; nothing is written when validation fails. Returns the
    /// confirmation text sent to the caller.
    pub async fn modify_video(
        &self,
        video_id: Option<&str>,
        action: Option<&str>,
    ) -> ServiceResult<String> {
        let (Some(video_id), Some(action)) = (present(video_id), present(action)) else {
            return Err(ServiceError::MissingParameter(
                "Missing video_id or action parameter",
            ));
        };
        let action = action
            .parse::<ArchiveAction>()
            .map_err(|err| ServiceError::InvalidAction(err.0))?;
        validate_video_id(video_id)?;

        self.within_deadline(async {
            self.flags
                .set_archived(video_id, action.is_archived())
                .await
                .map_err(|source| {
                    error!("Error writing flag for {}: {:#}", video_id, source);
                    ServiceError::FlagStore {
                        video_id: video_id.to_string(),
                        source,
                    }
                })
        })
        .await?;
        info!("Video {} set is_archived={}", video_id, action.is_archived());

        Ok(format!("Video {} has been {}.", video_id, action.past_tense()))
    }

    /// Current archive flag; a missing record counts as not archived.
    pub(crate) async fn is_archived(&self, video_id: &str) -> ServiceResult<bool> {
        let properties =
            self.flags
                .get(video_id)
                .await
                .map_err(|source| ServiceError::FlagStore {
                    video_id: video_id.to_string(),
                    source,
                })?;
        Ok(properties.is_some_and(|p| p.is_archived))
    }

    async fn object_exists(&self, key: &str) -> ServiceResult<bool> {
        self.objects
            .exists(key)
            .await
            .map_err(|source| ServiceError::ObjectStore {
                key: key.to_string(),
                source,
            })
    }

    pub(crate) async fn download_object(&self, key: &str) -> ServiceResult<Bytes> {
        self.objects.download(key).await.map_err(|source| {
            error!("Error reading object {}: {:#}", key, source);
            ServiceError::ObjectStore {
                key: key.to_string(),
                source,
            }
        })
    }

    pub(crate) fn decode(
        &self,
        key: &str,
        video_id: &str,
        bytes: &[u8],
    ) -> ServiceResult<VideoMetadata> {
        parse_metadata(video_id, bytes).map_err(|source| {
            error!("Error parsing JSON from {}: {}", key, source);
            ServiceError::Decode {
                key: key.to_string(),
                source,
            }
        })
    }

    pub(crate) async fn within_deadline<T>(
        &self,
        work: impl Future<Output = ServiceResult<T>>,
    ) -> ServiceResult<T> {
        let limit = self.options.request_timeout;
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::TimedOut(limit)),
        }
    }
}

/// Treat empty query values the same as absent ones.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Ids become object key stems, so they must stay a single path segment.
fn validate_video_id(video_id: &str) -> ServiceResult<()> {
    let valid = video_id.len() <= MAX_VIDEO_ID_LEN
        && video_id != "."
        && video_id != ".."
        && !video_id
            .chars()
            .any(|c| c.is_control() || c == '/' || c == '\\');
    if valid {
        Ok(())
    } else {
        Err(ServiceError::InvalidVideoId(video_id.to_string()))
    }
}
