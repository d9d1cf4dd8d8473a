//! Persisted record shapes shared by the ingest pipeline, query API and notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impact::ImpactAssessment;

/// Default source feed name
pub const DEFAULT_SOURCE: &str = "USGS";

/// One physical earthquake, keyed by the feed's stable identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeismicEvent {
    /// External identifier from the feed (unique)
    pub event_id: String,
    /// Magnitude, one fractional digit
    pub magnitude: f64,
    pub depth_km: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub occurred_at: DateTime<Utc>,
    pub place: String,
    /// Computed impact radius; absent only for rows written by older tooling
    pub impact_radius_km: Option<f64>,
    pub source: String,
}

/// An event together with every per-country impact assessed for it
///
/// Shape returned by the detail endpoint and pushed to live subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWithImpacts {
    pub event: SeismicEvent,
    pub impacts: Vec<ImpactAssessment>,
}
