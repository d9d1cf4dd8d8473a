//! seismo-ingest library interface
//!
//! Earthquake intake and impact assessment service. Exposes the pipeline,
//! storage and HTTP router for the binary and for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::http::{HeaderValue, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use seismo_common::events::NotificationHub;
use sqlx::SqlitePool;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::services::SeismicProcessor;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Live-update subscriber registry
    pub hub: NotificationHub,
    /// Processing pipeline, shared with the poller
    pub processor: Arc<SeismicProcessor>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Set while the background poll loop runs
    pub polling_active: Arc<AtomicBool>,
    /// Cancelled on shutdown; ends the poller and open live streams
    pub shutdown: CancellationToken,
    /// Allowed browser origins (empty allows any)
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(db: SqlitePool, hub: NotificationHub, processor: Arc<SeismicProcessor>) -> Self {
        Self {
            db,
            hub,
            processor,
            startup_time: Utc::now(),
            polling_active: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            cors_origins: Vec::new(),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}

/// CORS policy for the configured origins
///
/// An empty list or a `"*"` entry allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::event_routes())
        .route("/api/stream", get(api::earthquake_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.cors_origins))
        .with_state(state)
}
