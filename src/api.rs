// src/api.rs
//! Liveness and status endpoints.

use axum::{extract::State, routing::get, Json, Router};
use tower_http::trace::TraceLayer;

use crate::runtime::{RelayStatus, StatusSnapshot};

pub fn create_router(status: RelayStatus) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(relay_status))
        .layer(TraceLayer::new_for_http())
        .with_state(status)
}

async fn relay_status(State(status): State<RelayStatus>) -> Json<StatusSnapshot> {
    Json(status.snapshot())
}
