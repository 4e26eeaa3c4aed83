//! Liveness and readiness probes.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;

/// `GET /healthz` never touches the database or the store.
pub async fn healthz() -> impl IntoResponse {
    Json(ProbeBody {
        status: "ok",
        checks: BTreeMap::new(),
    })
}

/// `GET /readyz` runs `SELECT 1` against the metadata pool and asks the
/// object store for a round trip. 503 when either fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let metadata = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.db)
        .await
    {
        Ok(1) => Check::passed(),
        Ok(other) => Check::failed(format!("unexpected result: {}", other)),
        Err(err) => Check::failed(err.to_string()),
    };
    let object_store = match state.store.probe().await {
        Ok(()) => Check::passed(),
        Err(err) => Check::failed(err.to_string()),
    };

    let ready = metadata.ok && object_store.ok;
    if !ready {
        tracing::warn!(
            metadata = ?metadata.error,
            object_store = ?object_store.error,
            "readiness check failed"
        );
    }

    let checks = BTreeMap::from([("metadata", metadata), ("object_store", object_store)]);
    let (code, status) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "error")
    };
    (code, Json(ProbeBody { status, checks }))
}

#[derive(Serialize)]
struct ProbeBody {
    status: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    checks: BTreeMap<&'static str, Check>,
}

#[derive(Serialize)]
struct Check {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Check {
    fn passed() -> Self {
        Self { ok: true, error: None }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
