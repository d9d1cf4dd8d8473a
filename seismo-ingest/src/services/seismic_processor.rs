//! Seismic processing pipeline
//!
//! One cycle: fetch recent events → skip known ids → estimate radius →
//! persist event → assess impact (cache first) → persist impacts. Each event
//! is written in its own transaction; a failure rolls back that event and
//! the cycle moves on to the next.
//!
//! Cycles are serialized by an internal mutex so the scheduled poll and a
//! manual trigger never interleave their check-then-insert sequences. The
//! UNIQUE constraint on `event_id` catches anything that still races.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use seismo_common::{radius, EventWithImpacts, ImpactAssessment, SeismicEvent};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::events::{event_exists, insert_event, load_event, InsertOutcome};
use crate::db::impacts::{insert_impacts, load_impacts};
use crate::db::{inference_cache, stats};
use crate::services::feed_client::{FeedQuery, SeismicFeed};
use crate::services::inference::{
    HistoricalContext, ImpactInferenceClient, InferenceRequest, InferenceSource,
};

/// Half-width of the lat/lon box searched for historical context
const HISTORY_BOX_DEGREES: f64 = 5.0;
const HISTORY_MAX_EVENTS: i64 = 5;

/// Summary of one processing cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Ids persisted this cycle, in feed order
    pub processed: Vec<String>,
    /// Already stored (including lost insert races)
    pub skipped: usize,
    /// Rolled back after an error
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventOutcome {
    Processed,
    Skipped,
}

/// Pipeline orchestrator
pub struct SeismicProcessor {
    db: SqlitePool,
    feed: Arc<dyn SeismicFeed>,
    inference: ImpactInferenceClient,
    cache_ttl: ChronoDuration,
    cycle_lock: Mutex<()>,
}

impl SeismicProcessor {
    /// Create a processor
    ///
    /// # Arguments
    /// * `db` - Database connection pool
    /// * `feed` - Source of candidate events
    /// * `inference` - Impact assessment client
    /// * `cache_ttl` - Lifetime of cached model responses
    pub fn new(
        db: SqlitePool,
        feed: Arc<dyn SeismicFeed>,
        inference: ImpactInferenceClient,
        cache_ttl: ChronoDuration,
    ) -> Self {
        Self {
            db,
            feed,
            inference,
            cache_ttl,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Fetch and process new earthquakes from the default feed window
    pub async fn process_new_earthquakes(&self) -> CycleReport {
        self.process_with_query(&FeedQuery::default()).await
    }

    /// Fetch and process new earthquakes with explicit feed overrides
    pub async fn process_with_query(&self, query: &FeedQuery) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;

        match inference_cache::purge_expired(&self.db, Utc::now()).await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "Purged expired inference cache entries"),
            Err(e) => tracing::warn!(error = %e, "Inference cache purge failed"),
        }

        let candidates = self.feed.fetch_recent_earthquakes(query).await;
        let mut report = CycleReport::default();

        for candidate in candidates {
            let event_id = candidate.event_id.clone();
            match self.process_single_earthquake(candidate).await {
                Ok(EventOutcome::Processed) => report.processed.push(event_id),
                Ok(EventOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(event_id = %event_id, error = %format!("{:#}", e), "Error processing earthquake");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            processed = report.processed.len(),
            skipped = report.skipped,
            failed = report.failed,
            "Processing cycle complete"
        );

        report
    }

    /// Run one candidate through the pipeline
    async fn process_single_earthquake(&self, mut event: SeismicEvent) -> Result<EventOutcome> {
        if event_exists(&self.db, &event.event_id).await? {
            tracing::debug!(event_id = %event.event_id, "Event already processed, skipping");
            return Ok(EventOutcome::Skipped);
        }

        let radius_km = radius::estimate(event.magnitude, event.depth_km);
        event.impact_radius_km = Some(radius_km);

        tracing::info!(
            event_id = %event.event_id,
            magnitude = event.magnitude,
            depth_km = event.depth_km,
            radius_km,
            "Processing earthquake"
        );

        let historical_context = self.historical_context(&event).await;

        self.persist_event(&event, radius_km, historical_context).await
    }

    /// Store one event and its impacts in a single transaction
    ///
    /// An event that already exists at insert time lost a race with another
    /// writer and is skipped.
    async fn persist_event(
        &self,
        event: &SeismicEvent,
        radius_km: f64,
        historical_context: Option<HistoricalContext>,
    ) -> Result<EventOutcome> {
        let mut tx = self.db.begin().await.context("Failed to begin transaction")?;

        if insert_event(&mut tx, event).await? == InsertOutcome::AlreadyExists {
            tracing::info!(event_id = %event.event_id, "Event stored by a concurrent run, skipping");
            tx.rollback().await?;
            return Ok(EventOutcome::Skipped);
        }

        let request = InferenceRequest {
            latitude: event.latitude,
            longitude: event.longitude,
            magnitude: event.magnitude,
            depth_km: event.depth_km,
            radius_km,
            place: event.place.clone(),
            historical_context,
        };
        let impacts = self.assess(&mut tx, &request).await;

        insert_impacts(&mut tx, &event.event_id, &impacts).await?;
        tx.commit().await.context("Failed to commit event")?;

        tracing::info!(
            event_id = %event.event_id,
            countries = impacts.len(),
            "Successfully processed earthquake"
        );

        Ok(EventOutcome::Processed)
    }

    /// Impact assessments for a request, reusing a cached model answer when one is live
    ///
    /// Cache reads and writes go through the event's transaction connection.
    /// Cache errors are logged and otherwise ignored.
    async fn assess(&self, conn: &mut SqliteConnection, request: &InferenceRequest) -> Vec<ImpactAssessment> {
        let cache_key = self
            .inference
            .model_name()
            .map(|model| inference_cache::request_hash(&request.canonical_key(model)));

        if let Some(key) = &cache_key {
            match inference_cache::get_cached(&mut *conn, key, Utc::now()).await {
                Ok(Some(impacts)) => {
                    tracing::info!(countries = impacts.len(), "Using cached impact assessment");
                    return impacts;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Inference cache read failed"),
            }
        }

        let outcome = self.inference.infer_impact(request).await;

        if let (Some(key), InferenceSource::Model) = (&cache_key, outcome.source) {
            if let Err(e) =
                inference_cache::store(&mut *conn, key, &outcome.impacts, Utc::now(), self.cache_ttl).await
            {
                tracing::warn!(error = %e, "Inference cache write failed");
            }
        }

        outcome.impacts
    }

    /// Summaries of earlier stored events near this one; `None` when there are none
    async fn historical_context(&self, event: &SeismicEvent) -> Option<HistoricalContext> {
        let history = match stats::regional_history(
            &self.db,
            event.latitude,
            event.longitude,
            HISTORY_BOX_DEGREES,
            &event.event_id,
            HISTORY_MAX_EVENTS,
        )
        .await
        {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(error = %e, "Historical context lookup failed");
                return None;
            }
        };

        if history.is_empty() {
            return None;
        }

        let prior_events = history
            .iter()
            .map(|h| {
                format!(
                    "{} M{:.1} {}: {} estimated deaths ({})",
                    h.event.occurred_at.format("%Y-%m-%d"),
                    h.event.magnitude,
                    h.event.place,
                    h.total_deaths,
                    h.countries.as_deref().unwrap_or("no assessment")
                )
            })
            .collect();

        Some(HistoricalContext {
            summary: Some(format!(
                "{} previously assessed earthquake(s) within {} degrees",
                history.len(),
                HISTORY_BOX_DEGREES
            )),
            prior_events,
        })
    }

    /// Load an event together with all its impact assessments
    pub async fn get_event_with_impacts(&self, event_id: &str) -> Result<Option<EventWithImpacts>> {
        let Some(event) = load_event(&self.db, event_id).await? else {
            return Ok(None);
        };
        let impacts = load_impacts(&self.db, event_id).await?;

        Ok(Some(EventWithImpacts { event, impacts }))
    }

    /// Look up one event in the upstream feed without storing it
    pub async fn lookup_upstream(&self, event_id: &str) -> Option<SeismicEvent> {
        self.feed.fetch_single_earthquake(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct EmptyFeed;

    #[async_trait]
    impl SeismicFeed for EmptyFeed {
        async fn fetch_recent_earthquakes(&self, _query: &FeedQuery) -> Vec<SeismicEvent> {
            Vec::new()
        }

        async fn fetch_single_earthquake(&self, _event_id: &str) -> Option<SeismicEvent> {
            None
        }
    }

    fn event(event_id: &str) -> SeismicEvent {
        SeismicEvent {
            event_id: event_id.to_string(),
            magnitude: 6.5,
            depth_km: 20.0,
            latitude: -33.4,
            longitude: -70.6,
            occurred_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
            place: "Central Chile".to_string(),
            impact_radius_km: Some(500.0),
            source: "USGS".to_string(),
        }
    }

    #[tokio::test]
    async fn test_event_stored_after_check_is_skipped() {
        let pool = init_memory_pool().await.unwrap();
        let processor = SeismicProcessor::new(
            pool.clone(),
            Arc::new(EmptyFeed),
            ImpactInferenceClient::new(None),
            ChronoDuration::hours(24),
        );

        // Another writer commits between the exists check and our insert
        let quake = event("usgs-race");
        {
            let mut conn = pool.acquire().await.unwrap();
            assert_eq!(insert_event(&mut conn, &quake).await.unwrap(), InsertOutcome::Inserted);
        }

        let outcome = processor.persist_event(&quake, 500.0, None).await.unwrap();
        assert_eq!(outcome, EventOutcome::Skipped);

        let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seismic_events")
            .fetch_one(&pool)
            .await
            .unwrap();
        let impacts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM country_impacts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(events, 1);
        assert_eq!(impacts, 0);

        // The rolled-back transaction left the connection usable
        let fresh = event("usgs-fresh");
        assert_eq!(
            processor.persist_event(&fresh, 500.0, None).await.unwrap(),
            EventOutcome::Processed
        );
    }
}
