//! USGS earthquake feed client
//!
//! Queries the FDSN event service in GeoJSON form. Upstream failures never
//! propagate past [`SeismicFeed`]: they are logged and surface as an empty
//! result so a bad poll cycle simply finds nothing new.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use seismo_common::SeismicEvent;
use std::time::Duration;
use thiserror::Error;

use super::feed_normalizer::{normalize_collection, normalize_feature, normalize_value, Feature, FeatureCollection};

const USER_AGENT: &str = concat!("seismo-ingest/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Window used when no start time is given
const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Feed client errors
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Optional overrides for a recent-earthquakes query
#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    /// Defaults to `end - 24h`
    pub start: Option<DateTime<Utc>>,
    /// Defaults to now
    pub end: Option<DateTime<Utc>>,
    /// Defaults to the client's configured threshold
    pub min_magnitude: Option<f64>,
}

/// Source of normalized earthquake events
#[async_trait]
pub trait SeismicFeed: Send + Sync {
    /// Events matching the query, newest first; empty on any upstream failure
    async fn fetch_recent_earthquakes(&self, query: &FeedQuery) -> Vec<SeismicEvent>;

    /// A single event by external id; `None` when unknown or on failure
    async fn fetch_single_earthquake(&self, event_id: &str) -> Option<SeismicEvent>;
}

/// HTTP client for the USGS FDSN event service
pub struct UsgsClient {
    http_client: reqwest::Client,
    feed_url: String,
    min_magnitude: f64,
}

impl UsgsClient {
    pub fn new(feed_url: impl Into<String>, min_magnitude: f64) -> Result<Self, FeedError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FeedError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            feed_url: feed_url.into(),
            min_magnitude,
        })
    }

    /// Query parameters for a time-range search
    pub fn recent_query_params(&self, query: &FeedQuery, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
        let end = query.end.unwrap_or(now);
        let start = query
            .start
            .unwrap_or_else(|| end - ChronoDuration::hours(DEFAULT_LOOKBACK_HOURS));
        let min_magnitude = query.min_magnitude.unwrap_or(self.min_magnitude);

        vec![
            ("format", "geojson".to_string()),
            ("starttime", start.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ("endtime", end.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ("minmagnitude", min_magnitude.to_string()),
            ("orderby", "time".to_string()),
        ]
    }

    async fn get_json<T: DeserializeOwned>(&self, params: &[(&str, String)]) -> Result<T, FeedError> {
        tracing::debug!(url = %self.feed_url, ?params, "Querying seismic feed");

        let response = self
            .http_client
            .get(&self.feed_url)
            .query(params)
            .send()
            .await
            .map_err(|e| FeedError::NetworkError(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FeedError::ApiError(status.as_u16(), error_text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FeedError::ParseError(e.to_string()))
    }

    /// Fetch recent earthquakes, reporting upstream errors
    pub async fn try_fetch_recent(&self, query: &FeedQuery) -> Result<Vec<SeismicEvent>, FeedError> {
        let params = self.recent_query_params(query, Utc::now());
        let collection: FeatureCollection = self.get_json(&params).await?;
        Ok(normalize_collection(&collection))
    }

    /// Fetch one earthquake by id, reporting upstream errors
    pub async fn try_fetch_single(&self, event_id: &str) -> Result<Option<SeismicEvent>, FeedError> {
        let params = [("format", "geojson".to_string()), ("eventid", event_id.to_string())];
        let body: serde_json::Value = self.get_json(&params).await?;
        single_event_from_body(body)
    }
}

/// An `eventid` query answers with a bare Feature; mirrors may wrap it in a collection
pub fn single_event_from_body(body: serde_json::Value) -> Result<Option<SeismicEvent>, FeedError> {
    let is_feature = body.get("type").and_then(|t| t.as_str()) == Some("Feature");

    if is_feature {
        let feature: Feature = serde_json::from_value(body).map_err(|e| FeedError::ParseError(e.to_string()))?;
        Ok(normalize_feature(&feature))
    } else {
        let collection: FeatureCollection =
            serde_json::from_value(body).map_err(|e| FeedError::ParseError(e.to_string()))?;
        Ok(collection.features.first().and_then(normalize_value))
    }
}

#[async_trait]
impl SeismicFeed for UsgsClient {
    async fn fetch_recent_earthquakes(&self, query: &FeedQuery) -> Vec<SeismicEvent> {
        match self.try_fetch_recent(query).await {
            Ok(events) => {
                tracing::info!(count = events.len(), "Fetched earthquakes from USGS");
                events
            }
            Err(e) => {
                tracing::error!(error = %e, "Error fetching earthquakes from USGS");
                Vec::new()
            }
        }
    }

    async fn fetch_single_earthquake(&self, event_id: &str) -> Option<SeismicEvent> {
        match self.try_fetch_single(event_id).await {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(event_id = %event_id, error = %e, "Error fetching earthquake");
                None
            }
        }
    }
}
