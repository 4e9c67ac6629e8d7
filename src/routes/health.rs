//! Health check endpoints for liveness and readiness probes.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::errors::ApiResponse;
use crate::AppState;

/// Readiness probe detail.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// `ok` when the engine launches and the template root exists.
    pub status: String,
    pub engine: String,
    pub oracle: String,
    pub templates_root: String,
}

/// Liveness probe. Answers OK while the process is up.
pub async fn live() -> &'static str {
    "OK"
}

/// Readiness probe over the engine binary, the oracle credential and the template root.
pub async fn ready(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let executor = state.dispatcher.executor();

    let (engine_ok, engine) = match executor.engine().version().await {
        Ok(version) => (true, version),
        Err(e) => {
            tracing::warn!(error = %e, "Engine health check failed");
            (false, format!("error: {e}"))
        }
    };

    let oracle = if state.dispatcher.resolver().has_oracle() {
        "configured"
    } else {
        "not configured"
    };

    let root = executor.templates_root();
    let root_ok = root.is_dir();
    let templates_root = if root_ok {
        root.display().to_string()
    } else {
        tracing::warn!(path = %root.display(), "Template root missing");
        format!("missing: {}", root.display())
    };

    ApiResponse::success(HealthStatus {
        status: if engine_ok && root_ok { "ok" } else { "degraded" }.to_string(),
        engine,
        oracle: oracle.to_string(),
        templates_root,
    })
}
