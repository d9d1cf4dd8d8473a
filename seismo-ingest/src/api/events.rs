//! Event query and processing endpoints
//!
//! Read-only views over stored events and impacts, plus the manual
//! processing trigger.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use seismo_common::radius::{self, IntensityZones};
use seismo_common::{EventWithImpacts, ImpactAssessment, SeismicEvent};
use serde::{Deserialize, Serialize};

use crate::db::events::{count_events, list_events, EventFilter};
use crate::db::impacts::{count_impacts_by_country, impacts_by_country};
use crate::db::stats::{activity_summary, ActivitySummary};
use crate::error::{ApiError, ApiResult};
use crate::services::announce_processed;
use crate::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;
const DEFAULT_STATS_DAYS: i64 = 30;
const MAX_STATS_DAYS: i64 = 365;

/// Query parameters for GET /api/events
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub min_magnitude: Option<f64>,
    pub max_magnitude: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Query parameters for paginated endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub events: Vec<SeismicEvent>,
}

#[derive(Debug, Serialize)]
pub struct CountryImpactResult {
    pub event: SeismicEvent,
    pub impact: ImpactAssessment,
}

#[derive(Debug, Serialize)]
pub struct CountryResponse {
    pub country: String,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub results: Vec<CountryImpactResult>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub period_days: i64,
    #[serde(flatten)]
    pub summary: ActivitySummary,
}

/// Live feed event with derived radius figures
#[derive(Debug, Serialize)]
pub struct UpstreamEventResponse {
    #[serde(flatten)]
    pub event: SeismicEvent,
    pub intensity_zones: IntensityZones,
    pub energy_joules: f64,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub message: String,
    pub processed_count: usize,
    pub event_ids: Vec<String>,
    pub skipped_count: usize,
    pub failed_count: usize,
}

/// Validated (limit, offset)
fn page(limit: Option<i64>, offset: Option<i64>) -> ApiResult<(i64, i64)> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!("limit must be between 1 and {}", MAX_LIMIT)));
    }
    let offset = offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::BadRequest("offset must be >= 0".to_string()));
    }
    Ok((limit, offset))
}

fn magnitude_bound(name: &str, value: Option<f64>) -> ApiResult<Option<f64>> {
    match value {
        Some(m) if !(0.0..=10.0).contains(&m) => {
            Err(ApiError::BadRequest(format!("{} must be between 0 and 10", name)))
        }
        other => Ok(other),
    }
}

/// Parse an ISO-8601 timestamp; values without an offset are taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn date_bound(name: &str, value: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    match value {
        None => Ok(None),
        Some(raw) => parse_timestamp(raw)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid {} format", name))),
    }
}

fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(p)| p)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// GET /api/events
pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<EventListResponse>> {
    let params = query_params(params)?;
    let (limit, offset) = page(params.limit, params.offset)?;

    let filter = EventFilter {
        min_magnitude: magnitude_bound("min_magnitude", params.min_magnitude)?,
        max_magnitude: magnitude_bound("max_magnitude", params.max_magnitude)?,
        start: date_bound("start_date", params.start_date.as_deref())?,
        end: date_bound("end_date", params.end_date.as_deref())?,
    };

    let events = list_events(&state.db, &filter, limit, offset).await?;
    let total = count_events(&state.db, &filter).await?;

    Ok(Json(EventListResponse {
        total,
        limit,
        offset,
        events,
    }))
}

/// GET /api/events/:event_id
pub async fn detail(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> ApiResult<Json<EventWithImpacts>> {
    state
        .processor
        .get_event_with_impacts(&event_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Event not found: {}", event_id)))
}

/// GET /api/events/country/:country
pub async fn by_country(
    State(state): State<AppState>,
    Path(country): Path<String>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<CountryResponse>> {
    let params = query_params(params)?;
    let (limit, offset) = page(params.limit, params.offset)?;

    let records = impacts_by_country(&state.db, &country, limit, offset).await?;
    let total = count_impacts_by_country(&state.db, &country).await?;

    Ok(Json(CountryResponse {
        country,
        total,
        limit,
        offset,
        results: records
            .into_iter()
            .map(|r| CountryImpactResult {
                event: r.event,
                impact: r.impact,
            })
            .collect(),
    }))
}

/// GET /api/events/stats/summary
pub async fn stats_summary(
    State(state): State<AppState>,
    params: Result<Query<StatsParams>, QueryRejection>,
) -> ApiResult<Json<StatsResponse>> {
    let params = query_params(params)?;
    let days = params.days.unwrap_or(DEFAULT_STATS_DAYS);
    if !(1..=MAX_STATS_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!("days must be between 1 and {}", MAX_STATS_DAYS)));
    }

    let summary = activity_summary(&state.db, Utc::now() - Duration::days(days)).await?;

    Ok(Json(StatsResponse {
        period_days: days,
        summary,
    }))
}

/// GET /api/events/upstream/:event_id
///
/// Looks the event up in the live feed without storing it.
pub async fn upstream(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> ApiResult<Json<UpstreamEventResponse>> {
    let mut event = state
        .processor
        .lookup_upstream(&event_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Event not found upstream: {}", event_id)))?;

    event.impact_radius_km = Some(radius::estimate(event.magnitude, event.depth_km));
    let intensity_zones = radius::intensity_zones(event.magnitude, event.depth_km);
    let energy_joules = radius::energy_joules(event.magnitude);

    Ok(Json(UpstreamEventResponse {
        event,
        intensity_zones,
        energy_joules,
    }))
}

/// POST /api/events/process
///
/// Runs one processing cycle now and announces anything new.
pub async fn process(State(state): State<AppState>) -> ApiResult<Json<ProcessResponse>> {
    tracing::info!("Manual processing triggered");

    let report = state.processor.process_new_earthquakes().await;
    announce_processed(&state.processor, &state.hub, &report.processed).await;

    Ok(Json(ProcessResponse {
        message: "Processing completed".to_string(),
        processed_count: report.processed.len(),
        event_ids: report.processed,
        skipped_count: report.skipped,
        failed_count: report.failed,
    }))
}

/// Build event routes
pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list))
        .route("/api/events/process", post(process))
        .route("/api/events/stats/summary", get(stats_summary))
        .route("/api/events/country/:country", get(by_country))
        .route("/api/events/upstream/:event_id", get(upstream))
        .route("/api/events/:event_id", get(detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(parse_timestamp("2024-01-01T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T02:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-01"), None);
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page(None, None).unwrap(), (50, 0));
        assert_eq!(page(Some(500), Some(10)).unwrap(), (500, 10));
        assert!(page(Some(0), None).is_err());
        assert!(page(Some(501), None).is_err());
        assert!(page(None, Some(-1)).is_err());
    }

    #[test]
    fn test_magnitude_bound() {
        assert_eq!(magnitude_bound("m", Some(4.5)).unwrap(), Some(4.5));
        assert_eq!(magnitude_bound("m", None).unwrap(), None);
        assert!(magnitude_bound("m", Some(10.5)).is_err());
        assert!(magnitude_bound("m", Some(-0.1)).is_err());
    }
}
