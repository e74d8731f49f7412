//! Health & readiness handlers.
//!
//! - GET /healthz  -> process is up
//! - GET /readyz   -> flag store and object store both answer a ping

use crate::services::video_service::VideoService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Liveness only: answers `{"status":"ok"}` without touching either store.
/// Store reachability is reported by `/readyz`.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Pings both store clients. HTTP 200 when all checks pass, HTTP 503 when
/// any check fails.
pub async fn readyz(State(service): State<VideoService>) -> impl IntoResponse {
    let (flags, objects) = tokio::join!(service.flags.ping(), service.objects.ping());

    let mut checks = HashMap::new();
    checks.insert("flag_store", CheckStatus::from(flags));
    checks.insert("object_store", CheckStatus::from(objects));

    let overall_ok = checks.values().all(|check| check.ok);
    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl From<anyhow::Result<()>> for CheckStatus {
    fn from(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Self { ok: true, error: None },
            Err(err) => Self {
                ok: false,
                error: Some(format!("{err:#}")),
            },
        }
    }
}
