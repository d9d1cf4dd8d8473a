//! Health check and service index

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("seismo-ingest")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Whether the background poll loop is running
    pub polling_active: bool,
    /// Connected live-stream subscribers
    pub subscribers: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "seismo-ingest".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        polling_active: state.polling_active.load(Ordering::SeqCst),
        subscribers: state.hub.subscriber_count().await,
    })
}

/// GET / - service name, version and endpoint map
pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "seismo-ingest",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "events": "/api/events",
            "event_detail": "/api/events/{event_id}",
            "events_by_country": "/api/events/country/{country}",
            "statistics": "/api/events/stats/summary",
            "upstream_lookup": "/api/events/upstream/{event_id}",
            "process": "/api/events/process",
            "stream": "/api/stream",
            "health": "/health",
        }
    }))
}

/// Build health and index routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
}
