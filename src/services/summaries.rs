//! Summary listing: fan out over every metadata object, fan back in to one
//! ordered list.
//!
//! Each metadata key becomes one unit of work (flag check, download, parse).
//! Units run concurrently up to `max_concurrent_fetches` under a per-request
//! cancellation token, and the collected records are sorted afterwards so
//! completion order never reaches the response.

use crate::{
    models::video::VideoMetadata,
    services::{
        metadata::{METADATA_PREFIX, METADATA_SUFFIX, video_id_from_key},
        video_service::{DecodeFailurePolicy, ServiceError, ServiceResult, VideoService},
    },
};
use futures::{StreamExt, TryStreamExt, stream};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

impl VideoService {
    /// Every non-archived video's metadata, newest upload first.
    ///
    /// See [`VideoMetadata::newest_first`] for the exact order. Store failures
    /// fail the whole listing; decode failures follow the configured
    /// [`DecodeFailurePolicy`].
    pub async fn list_summaries(&self) -> ServiceResult<Vec<VideoMetadata>> {
        let cancel = self.shutdown.child_token();
        // Dropping the request future cancels anything still in flight.
        let _guard = cancel.clone().drop_guard();

        self.within_deadline(self.aggregate(&cancel)).await
    }

    async fn aggregate(&self, cancel: &CancellationToken) -> ServiceResult<Vec<VideoMetadata>> {
        let keys = self
            .objects
            .list_keys(METADATA_PREFIX)
            .await
            .map_err(|source| {
                error!("Error listing {}: {:#}", METADATA_PREFIX, source);
                ServiceError::ObjectStore {
                    key: METADATA_PREFIX.to_string(),
                    source,
                }
            })?;
        info!("Found {} files in {}", keys.len(), METADATA_PREFIX);

        let keys = keys
            .into_iter()
            .filter(|key| key.ends_with(METADATA_SUFFIX))
            .collect::<Vec<_>>();
        let limit = self.options.max_concurrent_fetches.max(1);

        let entries = stream::iter(keys)
            .map(|key| cancellable(cancel, self.load_entry(key)))
            .buffer_unordered(limit)
            .try_collect::<Vec<_>>()
            .await?;

        let mut records = entries.into_iter().flatten().collect::<Vec<_>>();
        records.sort_by(VideoMetadata::newest_first);

        info!("Successfully processed {} metadata files", records.len());
        Ok(records)
    }

    /// One unit of work. `Ok(None)` means the key contributes no record.
    async fn load_entry(&self, key: String) -> ServiceResult<Option<VideoMetadata>> {
        let Some(video_id) = video_id_from_key(&key) else {
            warn!("Skipping {}: not a top-level metadata key", key);
            return Ok(None);
        };

        if self.is_archived(video_id).await? {
            debug!("Skipping archived video {}", video_id);
            return Ok(None);
        }

        let bytes = self.download_object(&key).await?;
        match self.decode(&key, video_id, &bytes) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(err) if self.options.decode_failure == DecodeFailurePolicy::Skip => {
                warn!("Leaving {} out of the listing: {}", key, err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// Run `work` unless `cancel` fires first. A failing unit cancels its siblings.
async fn cancellable<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = ServiceResult<T>>,
) -> ServiceResult<T> {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ServiceError::Cancelled),
        result = work => result,
    };
    if result.is_err() {
        cancel.cancel();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        flag_store::{FlagStore, tests::memory_store},
        object_store::{LocalObjectStore, ObjectStore},
        video_service::{
            ServiceOptions,
            tests::{BrokenFlags, put, service_at, service_with_flags},
        },
    };
    use anyhow::anyhow;
    use bytes::Bytes;
    use futures::future::BoxFuture;
    use serde_json::{Value, json};
    use std::{
        path::Path,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    fn ids(records: &[VideoMetadata]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    async fn seed(root: &Path, entries: &[(&str, Value)]) {
        for (id, body) in entries {
            put(root, &format!("video-metadata/{id}.json"), &body.to_string()).await;
        }
    }

    #[tokio::test]
    async fn lists_non_archived_records_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        seed(
            dir.path(),
            &[
                ("old", json!({"title": "Old", "upload_date": "20200101"})),
                ("new", json!({"title": "New", "upload_date": "20240501"})),
                ("mid", json!({"title": "Mid", "upload_date": "20220815"})),
                ("gone", json!({"title": "Gone", "upload_date": "20250101"})),
                ("undated", json!({"title": "Undated"})),
            ],
        )
        .await;
        put(dir.path(), "video-metadata/notes.txt", "ignored").await;
        put(dir.path(), "summaries/new.md", "# New").await;

        let (service, flags) = service_at(dir.path()).await;
        flags.set_archived("gone", true).await.unwrap();
        flags.set_archived("mid", false).await.unwrap();

        let records = service.list_summaries().await.unwrap();
        assert_eq!(ids(&records), ["new", "mid", "old", "undated"]);
        assert_eq!(records[0].fields.get("title"), Some(&json!("New")));
    }

    #[tokio::test]
    async fn repeated_listings_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let entries = (0..40)
            .map(|i| {
                (
                    format!("v{i:02}"),
                    json!({"upload_date": format!("2023{:02}01", i % 12 + 1)}),
                )
            })
            .collect::<Vec<_>>();
        for (id, body) in &entries {
            put(dir.path(), &format!("video-metadata/{id}.json"), &body.to_string()).await;
        }
        let (service, _) = service_at(dir.path()).await;

        let first = service.list_summaries().await.unwrap();
        let second = service.list_summaries().await.unwrap();
        assert_eq!(first.len(), 40);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn record_ids_come_from_keys() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &[("abc123", json!({"id": "spoofed", "title": "T"}))]).await;
        let (service, _) = service_at(dir.path()).await;

        let records = service.list_summaries().await.unwrap();
        assert_eq!(
            serde_json::to_value(&records).unwrap(),
            json!([{"title": "T", "id": "abc123"}])
        );
    }

    #[tokio::test]
    async fn nested_keys_do_not_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &[("x", json!({"title": "Current"}))]).await;
        put(dir.path(), "video-metadata/old/x.json", r#"{"title":"Stale"}"#).await;
        let (service, _) = service_at(dir.path()).await;

        let records = service.list_summaries().await.unwrap();
        assert_eq!(ids(&records), ["x"]);
        assert_eq!(records[0].fields.get("title"), Some(&json!("Current")));
    }

    #[tokio::test]
    async fn flag_read_failure_aborts_listing() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &[("abc", json!({"title": "T"}))]).await;
        let service = service_with_flags(dir.path(), BrokenFlags::Failing);

        assert!(matches!(
            service.list_summaries().await,
            Err(ServiceError::FlagStore { video_id, .. }) if video_id == "abc"
        ));
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service_at(dir.path()).await;
        assert!(service.list_summaries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_object_aborts_listing_by_default() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &[("good", json!({"upload_date": "20240101"}))]).await;
        put(dir.path(), "video-metadata/bad.json", "{\"title\": ").await;
        let (service, _) = service_at(dir.path()).await;

        assert!(matches!(
            service.list_summaries().await,
            Err(ServiceError::Decode { key, .. }) if key == "video-metadata/bad.json"
        ));
    }

    #[tokio::test]
    async fn corrupt_object_is_skipped_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &[("good", json!({"upload_date": "20240101"}))]).await;
        put(dir.path(), "video-metadata/bad.json", "not json").await;
        let (mut service, _) = service_at(dir.path()).await;
        service.options.decode_failure = DecodeFailurePolicy::Skip;

        let records = service.list_summaries().await.unwrap();
        assert_eq!(ids(&records), ["good"]);
    }

    #[tokio::test]
    async fn archived_corrupt_object_is_never_read() {
        let dir = tempfile::tempdir().unwrap();
        put(dir.path(), "video-metadata/bad.json", "not json").await;
        let (service, flags) = service_at(dir.path()).await;
        flags.set_archived("bad", true).await.unwrap();

        assert!(service.list_summaries().await.unwrap().is_empty());
    }

    /// Serves a fixed key list; downloads of `broken` fail, others sleep for
    /// `delay` so in-flight work can be observed.
    struct FlakyStore {
        keys: Vec<String>,
        broken: Option<String>,
        delay: Duration,
        started: AtomicUsize,
        completed: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FlakyStore {
        fn new(count: usize, broken: Option<&str>) -> Self {
            Self {
                keys: (0..count)
                    .map(|i| format!("video-metadata/v{i}.json"))
                    .collect(),
                broken: broken.map(str::to_string),
                delay: Duration::from_millis(5),
                started: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    /// Decrements `in_flight` however the download ends, including when its
    /// future is dropped mid-sleep.
    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ObjectStore for FlakyStore {
        fn list_keys<'a>(
            &'a self,
            _prefix: &'a str,
        ) -> BoxFuture<'a, anyhow::Result<Vec<String>>> {
            Box::pin(async move { Ok(self.keys.clone()) })
        }

        fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<bool>> {
            Box::pin(async move { Ok(self.keys.iter().any(|k| k == key)) })
        }

        fn download<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<Bytes>> {
            Box::pin(async move {
                if self.broken.as_deref() == Some(key) {
                    return Err(anyhow!("connection reset"));
                }
                self.started.fetch_add(1, Ordering::SeqCst);
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                let _in_flight = InFlight(&self.in_flight);
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                self.completed.fetch_add(1, Ordering::SeqCst);
                Ok(Bytes::from_static(b"{\"upload_date\":\"20240101\"}"))
            })
        }

        fn ping(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    async fn service_with(store: Arc<FlakyStore>, options: ServiceOptions) -> VideoService {
        VideoService::new(
            store,
            Arc::new(memory_store().await),
            options,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn fan_out_respects_concurrency_bound() {
        let store = Arc::new(FlakyStore::new(24, None));
        let options = ServiceOptions {
            max_concurrent_fetches: 3,
            ..ServiceOptions::default()
        };
        let service = service_with(store.clone(), options).await;

        let records = service.list_summaries().await.unwrap();
        assert_eq!(records.len(), 24);
        assert!(store.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(store.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transport_failure_aborts_listing() {
        let store = Arc::new(FlakyStore::new(8, Some("video-metadata/v5.json")));
        let service = service_with(store, ServiceOptions::default()).await;

        assert!(matches!(
            service.list_summaries().await,
            Err(ServiceError::ObjectStore { key, .. }) if key == "video-metadata/v5.json"
        ));
    }

    #[tokio::test]
    async fn shutdown_cancels_listing() {
        let store = Arc::new(FlakyStore::new(4, None));
        let service = service_with(store, ServiceOptions::default()).await;
        service.shutdown.cancel();

        assert!(matches!(
            service.list_summaries().await,
            Err(ServiceError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn dropping_the_request_stops_in_flight_downloads() {
        let store = Arc::new(FlakyStore::new(8, None).with_delay(Duration::from_secs(60)));
        let options = ServiceOptions {
            max_concurrent_fetches: 4,
            request_timeout: Duration::from_secs(120),
            ..ServiceOptions::default()
        };
        let service = service_with(store.clone(), options).await;

        let request = tokio::spawn(async move { service.list_summaries().await });
        while store.started.load(Ordering::SeqCst) < 4 {
            tokio::task::yield_now().await;
        }
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());

        assert_eq!(store.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(store.completed.load(Ordering::SeqCst), 0);
        assert_eq!(store.started.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn slow_listing_times_out() {
        let store = Arc::new(FlakyStore::new(50, None));
        let options = ServiceOptions {
            max_concurrent_fetches: 1,
            request_timeout: Duration::from_millis(20),
            ..ServiceOptions::default()
        };
        let service = service_with(store, options).await;

        assert!(matches!(
            service.list_summaries().await,
            Err(ServiceError::TimedOut(_))
        ));
    }

    #[tokio::test]
    async fn local_store_listing_matches_flag_state() {
        let dir = tempfile::tempdir().unwrap();
        let ids_in_store = ["a", "b", "c", "d", "e", "f"];
        for id in ids_in_store {
            put(dir.path(), &format!("video-metadata/{id}.json"), "{}").await;
        }
        let flags = memory_store().await;
        for id in ["b", "e"] {
            flags.set_archived(id, true).await.unwrap();
        }
        let service = VideoService::new(
            Arc::new(LocalObjectStore::new(dir.path())),
            Arc::new(flags),
            ServiceOptions::default(),
            CancellationToken::new(),
        );

        let records = service.list_summaries().await.unwrap();
        assert_eq!(ids(&records), ["a", "c", "d", "f"]);
    }
}
