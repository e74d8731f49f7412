//! Flag store client.
//!
//! [`FlagStore`] reads and writes the per-video `is_archived` flag.
//! [`SqliteFlagStore`] keeps one row per video in `video_properties`; columns
//! other than `is_archived` are never written by this service.

use crate::models::properties::VideoProperties;
use anyhow::Context;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::debug;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Per-video flag storage contract.
pub trait FlagStore: Send + Sync + 'static {
    /// The stored record for `video_id`, or `None` when nothing was ever written.
    fn get<'a>(
        &'a self,
        video_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<VideoProperties>>>;

    /// Set `is_archived`, creating the record if needed and preserving every
    /// other field.
    fn set_archived<'a>(
        &'a self,
        video_id: &'a str,
        is_archived: bool,
    ) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Cheap reachability check backing `/readyz`.
    fn ping(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

#[derive(FromRow)]
struct PropertiesRow {
    is_archived: bool,
    properties: String,
}

#[derive(Clone)]
pub struct SqliteFlagStore {
    db: Arc<SqlitePool>,
}

impl SqliteFlagStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt)
                .execute(&*self.db)
                .await
                .context("applying flag store schema")?;
        }
        Ok(())
    }
}

impl FlagStore for SqliteFlagStore {
    fn get<'a>(
        &'a self,
        video_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<VideoProperties>>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, PropertiesRow>(
                "SELECT is_archived, properties FROM video_properties WHERE video_id = ?",
            )
            .bind(video_id)
            .fetch_optional(&*self.db)
            .await
            .with_context(|| format!("reading properties for `{video_id}`"))?;

            let Some(row) = row else {
                return Ok(None);
            };

            let other = match serde_json::from_str::<Value>(&row.properties)
                .with_context(|| format!("decoding properties for `{video_id}`"))?
            {
                Value::Object(mut map) => {
                    map.shift_remove("is_archived");
                    map
                }
                _ => Map::new(),
            };

            Ok(Some(VideoProperties {
                is_archived: row.is_archived,
                other,
            }))
        })
    }

    fn set_archived<'a>(
        &'a self,
        video_id: &'a str,
        is_archived: bool,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO video_properties (video_id, is_archived)
                VALUES (?, ?)
                ON CONFLICT(video_id) DO UPDATE SET
                    is_archived = excluded.is_archived
                "#,
            )
            .bind(video_id)
            .bind(is_archived)
            .execute(&*self.db)
            .await
            .with_context(|| format!("writing properties for `{video_id}`"))?;
            Ok(())
        })
    }

    fn ping(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let one = sqlx::query_scalar::<_, i64>("SELECT 1")
                .fetch_one(&*self.db)
                .await
                .context("pinging flag store")?;
            anyhow::ensure!(one == 1, "unexpected ping result: {one}");
            Ok(())
        })
    }
}
