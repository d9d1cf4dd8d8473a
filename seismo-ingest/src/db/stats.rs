//! Aggregate statistics and regional history queries

use anyhow::Result;
use chrono::{DateTime, Utc};
use seismo_common::SeismicEvent;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use super::events::event_from_row;
use super::to_db_time;

/// Summed casualty and loss estimates
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CasualtyTotals {
    pub deaths: i64,
    pub injuries: i64,
    pub economic_losses_usd: i64,
}

/// Per-country totals, ranked by deaths
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryTotals {
    pub country: String,
    pub event_count: i64,
    pub total_deaths: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySummary {
    pub total_events: i64,
    /// 0.0 when the window holds no events
    pub average_magnitude: f64,
    pub highest_magnitude_event: Option<SeismicEvent>,
    pub estimated_casualties: CasualtyTotals,
    pub most_affected_countries: Vec<CountryTotals>,
}

const TOP_COUNTRIES: i64 = 10;

/// Summarize activity for events that occurred at or after `since`
pub async fn activity_summary(pool: &SqlitePool, since: DateTime<Utc>) -> Result<ActivitySummary> {
    let since = to_db_time(&since);

    let row = sqlx::query("SELECT COUNT(*), AVG(magnitude) FROM seismic_events WHERE occurred_at >= ?")
        .bind(&since)
        .fetch_one(pool)
        .await?;
    let total_events: i64 = row.try_get(0)?;
    let average_magnitude: Option<f64> = row.try_get(1)?;

    let highest = sqlx::query(
        r#"
        SELECT event_id, magnitude, depth_km, latitude, longitude, occurred_at,
               place, impact_radius_km, source
        FROM seismic_events
        WHERE occurred_at >= ?
        ORDER BY magnitude DESC, occurred_at DESC
        LIMIT 1
        "#,
    )
    .bind(&since)
    .fetch_optional(pool)
    .await?;
    let highest_magnitude_event = highest.map(|row| event_from_row(&row)).transpose()?;

    let row = sqlx::query(
        r#"
        SELECT SUM(i.estimated_deaths), SUM(i.estimated_injuries), SUM(i.economic_loss_usd)
        FROM country_impacts i
        JOIN seismic_events e ON e.event_id = i.event_id
        WHERE e.occurred_at >= ?
        "#,
    )
    .bind(&since)
    .fetch_one(pool)
    .await?;
    let estimated_casualties = CasualtyTotals {
        deaths: row.try_get::<Option<i64>, _>(0)?.unwrap_or(0),
        injuries: row.try_get::<Option<i64>, _>(1)?.unwrap_or(0),
        economic_losses_usd: row.try_get::<Option<i64>, _>(2)?.unwrap_or(0),
    };

    let rows = sqlx::query(
        r#"
        SELECT i.country, COUNT(i.id) AS event_count, SUM(i.estimated_deaths) AS total_deaths
        FROM country_impacts i
        JOIN seismic_events e ON e.event_id = i.event_id
        WHERE e.occurred_at >= ?
        GROUP BY i.country
        ORDER BY total_deaths DESC, i.country
        LIMIT ?
        "#,
    )
    .bind(&since)
    .bind(TOP_COUNTRIES)
    .fetch_all(pool)
    .await?;

    let most_affected_countries = rows
        .iter()
        .map(|row| {
            Ok(CountryTotals {
                country: row.try_get("country")?,
                event_count: row.try_get("event_count")?,
                total_deaths: row.try_get::<Option<i64>, _>("total_deaths")?.unwrap_or(0),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ActivitySummary {
        total_events,
        average_magnitude: average_magnitude.unwrap_or(0.0),
        highest_magnitude_event,
        estimated_casualties,
        most_affected_countries,
    })
}

/// A stored event near a location, with its summed death estimate
#[derive(Debug, Clone, PartialEq)]
pub struct RegionalEvent {
    pub event: SeismicEvent,
    pub total_deaths: i64,
    /// Comma-separated countries assessed for the event
    pub countries: Option<String>,
}

/// Previously stored events inside a lat/lon box around a point, largest first
///
/// The box does not wrap across the antimeridian.
pub async fn regional_history(
    pool: &SqlitePool,
    latitude: f64,
    longitude: f64,
    degrees: f64,
    exclude_event_id: &str,
    limit: i64,
) -> Result<Vec<RegionalEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT e.event_id, e.magnitude, e.depth_km, e.latitude, e.longitude, e.occurred_at,
               e.place, e.impact_radius_km, e.source,
               COALESCE(SUM(i.estimated_deaths), 0) AS total_deaths,
               GROUP_CONCAT(i.country, ', ') AS countries
        FROM seismic_events e
        LEFT JOIN country_impacts i ON i.event_id = e.event_id
        WHERE e.latitude BETWEEN ? AND ?
          AND e.longitude BETWEEN ? AND ?
          AND e.event_id <> ?
        GROUP BY e.id
        ORDER BY e.magnitude DESC, e.occurred_at DESC
        LIMIT ?
        "#,
    )
    .bind(latitude - degrees)
    .bind(latitude + degrees)
    .bind(longitude - degrees)
    .bind(longitude + degrees)
    .bind(exclude_event_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(RegionalEvent {
                event: event_from_row(row)?,
                total_deaths: row.try_get("total_deaths")?,
                countries: row.try_get("countries")?,
            })
        })
        .collect()
}
