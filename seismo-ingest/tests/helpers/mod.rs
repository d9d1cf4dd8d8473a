//! Shared fixtures for seismo-ingest integration tests
//!
//! Scripted stand-ins for the feed and the chat model so the pipeline and
//! router can run end to end against an in-memory database.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use seismo_common::events::NotificationHub;
use seismo_common::SeismicEvent;
use seismo_ingest::services::feed_client::{FeedQuery, SeismicFeed};
use seismo_ingest::services::inference::client::{ChatCompletion, ChatRequest, InferenceError};
use seismo_ingest::services::{ImpactInferenceClient, SeismicProcessor};
use seismo_ingest::{build_router, db, AppState};
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MODEL: &str = "scripted/model";

pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::hours(hours)
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// A feed-shaped event (no radius yet)
pub fn quake(event_id: &str, magnitude: f64, occurred_at: DateTime<Utc>) -> SeismicEvent {
    SeismicEvent {
        event_id: event_id.to_string(),
        magnitude,
        depth_km: 10.0,
        latitude: 35.0,
        longitude: 139.0,
        occurred_at,
        place: "near Tokyo, Japan".to_string(),
        impact_radius_km: None,
        source: "USGS".to_string(),
    }
}

/// Feed returning a fixed list on every call
pub struct StaticFeed {
    events: Mutex<Vec<SeismicEvent>>,
    pub calls: AtomicUsize,
}

impl StaticFeed {
    pub fn new(events: Vec<SeismicEvent>) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(events),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn replace(&self, events: Vec<SeismicEvent>) {
        *self.events.lock().unwrap() = events;
    }
}

#[async_trait]
impl SeismicFeed for StaticFeed {
    async fn fetch_recent_earthquakes(&self, _query: &FeedQuery) -> Vec<SeismicEvent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().clone()
    }

    async fn fetch_single_earthquake(&self, event_id: &str) -> Option<SeismicEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned()
    }
}

/// Chat model replaying scripted answers in order
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, InferenceError>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<String, InferenceError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Answers `text` for every call
    pub fn always(text: &str, times: usize) -> Arc<Self> {
        Self::new((0..times).map(|_| Ok(text.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User prompts received, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletion for ScriptedModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(user) = request.messages.iter().find(|m| m.role == "user") {
            self.prompts.lock().unwrap().push(user.content.clone());
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(InferenceError::NetworkError("script exhausted".to_string())))
    }

    fn model_name(&self) -> &str {
        MODEL
    }
}

/// Inference client over an optional scripted model with no warm-up delay
pub fn inference(model: Option<Arc<ScriptedModel>>) -> ImpactInferenceClient {
    ImpactInferenceClient::new(model.map(|m| m as Arc<dyn ChatCompletion>)).with_retry_delay(Duration::ZERO)
}

pub async fn processor(
    feed: Arc<StaticFeed>,
    model: Option<Arc<ScriptedModel>>,
) -> (Arc<SeismicProcessor>, SqlitePool) {
    let pool = db::init_memory_pool().await.expect("in-memory database");
    let processor = Arc::new(SeismicProcessor::new(
        pool.clone(),
        feed,
        inference(model),
        chrono::Duration::hours(24),
    ));
    (processor, pool)
}

/// Router plus handles for seeding and inspection
pub struct TestApp {
    pub router: axum::Router,
    pub pool: SqlitePool,
    pub hub: NotificationHub,
    pub feed: Arc<StaticFeed>,
}

/// Fallback-only app state over a scripted feed
pub async fn test_state(feed_events: Vec<SeismicEvent>) -> (AppState, Arc<StaticFeed>) {
    let feed = StaticFeed::new(feed_events);
    let (processor, pool) = processor(feed.clone(), None).await;
    (AppState::new(pool, NotificationHub::new(16), processor), feed)
}

pub fn app_from_state(state: AppState, feed: Arc<StaticFeed>) -> TestApp {
    TestApp {
        pool: state.db.clone(),
        hub: state.hub.clone(),
        router: build_router(state),
        feed,
    }
}

pub async fn test_app(feed_events: Vec<SeismicEvent>) -> TestApp {
    let (state, feed) = test_state(feed_events).await;
    app_from_state(state, feed)
}
