// GET handlers: version, latest snapshot, period table

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;
use crate::version::{NAME, VERSION};

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/snapshot: latest cycle's snapshot; 404 until the first cycle completes.
pub(super) async fn snapshot_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.publisher.latest() {
        Some(snapshot) => axum::Json(snapshot.as_ref().clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "no snapshot yet").into_response(),
    }
}

/// GET /api/periods: the period table every snapshot is computed from.
pub(super) async fn periods_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.periods.as_ref().clone())
}
