//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks SQLite and the upload spool directory

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness only. Never touches the database or the disk.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 1. Runs `SELECT 1` against SQLite, which also holds the object chunks.
/// 2. Writes, reads back and removes a marker file in the upload spool
///    directory, where every multipart upload lands first.
///
/// HTTP 200 when both pass, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("sqlite", check_sqlite(&state).await);
    checks.insert("upload_dir", check_dir(&state.upload_dir).await);

    let ready = checks.values().all(|check| check.ok);
    if !ready {
        tracing::warn!(?checks, "readiness check failed");
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            status: if ready { "ok" } else { "error" },
            checks,
        }),
    )
}

async fn check_sqlite(state: &AppState) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.db)
        .await
    {
        Ok(1) => CheckStatus::pass(),
        Ok(v) => CheckStatus::fail(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::fail(format!("error: {}", e)),
    }
}

async fn check_dir(dir: &Path) -> CheckStatus {
    let marker = dir.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&marker, b"readyz").await {
        return CheckStatus::fail(format!("could not write marker file: {}", e));
    }

    let check = match fs::read(&marker).await {
        Ok(bytes) if bytes == b"readyz" => CheckStatus::pass(),
        Ok(_) => CheckStatus::fail("marker file content mismatch".to_string()),
        Err(e) => CheckStatus::fail(format!("could not read marker file: {}", e)),
    };

    // a leftover marker file is harmless; report it but stay ready
    match fs::remove_file(&marker).await {
        Err(e) if check.ok => CheckStatus {
            ok: true,
            error: Some(format!("could not remove marker file: {}", e)),
        },
        _ => check,
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize, Debug)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn pass() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn fail(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
