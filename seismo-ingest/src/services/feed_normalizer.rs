//! USGS GeoJSON → canonical event conversion
//!
//! Feed format reference:
//! <https://earthquake.usgs.gov/earthquakes/feed/v1.0/geojson.php>
//!
//! Features are decoded one at a time. A feature that does not decode, or
//! that lacks a magnitude, an id, a time or a full `[longitude, latitude,
//! depth]` coordinate triple, is skipped rather than failing the whole batch.

use chrono::DateTime;
use seismo_common::models::DEFAULT_SOURCE;
use seismo_common::SeismicEvent;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Top-level GeoJSON response
///
/// Features stay raw until [`normalize_collection`] decodes them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Value>,
}

/// One earthquake feature
#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    pub id: Option<String>,
    #[serde(default)]
    pub properties: FeatureProperties,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureProperties {
    pub mag: Option<f64>,
    pub place: Option<String>,
    /// Origin time, milliseconds since the Unix epoch
    pub time: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Geometry {
    /// `[longitude, latitude, depth_km]`; USGS occasionally emits nulls
    #[serde(default)]
    pub coordinates: Vec<Option<f64>>,
}

/// Convert a single feature, or `None` when it lacks required data
pub fn normalize_feature(feature: &Feature) -> Option<SeismicEvent> {
    let event_id = feature.id.as_deref().filter(|id| !id.is_empty())?;
    let magnitude = feature.properties.mag?;
    let coordinates = &feature.geometry.as_ref()?.coordinates;

    if coordinates.len() < 3 {
        return None;
    }
    let longitude = coordinates[0]?;
    let latitude = coordinates[1]?;
    let depth_km = coordinates[2]?;

    let occurred_at = DateTime::from_timestamp_millis(feature.properties.time?)?;

    Some(SeismicEvent {
        event_id: event_id.to_string(),
        magnitude: round_magnitude(magnitude),
        depth_km,
        latitude,
        longitude,
        occurred_at,
        place: feature.properties.place.clone().unwrap_or_default(),
        impact_radius_km: None,
        source: DEFAULT_SOURCE.to_string(),
    })
}

/// Decode and convert one raw feature
pub fn normalize_value(value: &Value) -> Option<SeismicEvent> {
    match Feature::deserialize(value) {
        Ok(feature) => normalize_feature(&feature),
        Err(e) => {
            debug!(id = ?value.get("id"), "Undecodable feed feature: {}", e);
            None
        }
    }
}

/// Convert every usable feature in a collection, preserving feed order
pub fn normalize_collection(collection: &FeatureCollection) -> Vec<SeismicEvent> {
    let events: Vec<SeismicEvent> = collection.features.iter().filter_map(normalize_value).collect();

    let skipped = collection.features.len() - events.len();
    if skipped > 0 {
        debug!(skipped, "Skipped incomplete feed features");
    }

    events
}

/// Magnitudes are kept to one fractional digit
fn round_magnitude(magnitude: f64) -> f64 {
    (magnitude * 10.0).round() / 10.0
}
