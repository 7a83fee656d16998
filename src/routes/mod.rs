// HTTP + WebSocket routes: the snapshot sink surface for dashboards.

mod http;
mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tower_http::cors::{Any, CorsLayer};

use crate::models::PeriodTable;
use crate::sink::SnapshotPublisher;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) publisher: SnapshotPublisher,
    pub(crate) periods: Arc<PeriodTable>,
    pub(crate) ws_snapshot_connections: Arc<AtomicUsize>,
}

pub fn app(
    publisher: SnapshotPublisher,
    periods: Arc<PeriodTable>,
    ws_snapshot_connections: Arc<AtomicUsize>,
) -> Router {
    let state = AppState {
        publisher,
        periods,
        ws_snapshot_connections,
    };
    Router::new()
        .route("/", get(|| async { "homestats: period statistics" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/snapshot", get(http::snapshot_handler)) // GET /api/snapshot
        .route("/api/periods", get(http::periods_handler)) // GET /api/periods
        .route("/ws/snapshot", get(ws::ws_snapshot)) // WS /ws/snapshot
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
