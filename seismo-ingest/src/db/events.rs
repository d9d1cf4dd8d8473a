//! Seismic event persistence
//!
//! Events are keyed by the feed's external identifier. The UNIQUE constraint
//! on `event_id` is the final word on deduplication: inserts use
//! `ON CONFLICT DO NOTHING` and report whether a row was actually written.

use anyhow::Result;
use chrono::{DateTime, Utc};
use seismo_common::SeismicEvent;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::{from_db_time, to_db_time};

/// Outcome of an event insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another writer already stored this external id
    AlreadyExists,
}

/// Filters for listing events; `None` means unbounded
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub min_magnitude: Option<f64>,
    pub max_magnitude: Option<f64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

const EVENT_COLUMNS: &str = "event_id, magnitude, depth_km, latitude, longitude, occurred_at, \
                             place, impact_radius_km, source";

/// Check whether an event with this external id is already stored
pub async fn event_exists(pool: &SqlitePool, event_id: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seismic_events WHERE event_id = ?")
        .bind(event_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Insert an event inside the caller's transaction
pub async fn insert_event(conn: &mut SqliteConnection, event: &SeismicEvent) -> Result<InsertOutcome> {
    let result = sqlx::query(
        r#"
        INSERT INTO seismic_events
            (event_id, magnitude, depth_km, latitude, longitude, occurred_at, place, impact_radius_km, source)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(event_id) DO NOTHING
        "#,
    )
    .bind(&event.event_id)
    .bind(event.magnitude)
    .bind(event.depth_km)
    .bind(event.latitude)
    .bind(event.longitude)
    .bind(to_db_time(&event.occurred_at))
    .bind(&event.place)
    .bind(event.impact_radius_km)
    .bind(&event.source)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        Ok(InsertOutcome::AlreadyExists)
    } else {
        Ok(InsertOutcome::Inserted)
    }
}

/// Load one event by external id
pub async fn load_event(pool: &SqlitePool, event_id: &str) -> Result<Option<SeismicEvent>> {
    let sql = format!("SELECT {} FROM seismic_events WHERE event_id = ?", EVENT_COLUMNS);
    let row = sqlx::query(&sql).bind(event_id).fetch_optional(pool).await?;

    row.map(|row| event_from_row(&row)).transpose()
}

/// List events matching the filter, newest first
pub async fn list_events(
    pool: &SqlitePool,
    filter: &EventFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<SeismicEvent>> {
    let sql = format!(
        "SELECT {} FROM seismic_events WHERE {} ORDER BY occurred_at DESC LIMIT ? OFFSET ?",
        EVENT_COLUMNS, FILTER_CLAUSE
    );

    let rows = bind_filter(sqlx::query(&sql), filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(event_from_row).collect()
}

/// Count events matching the filter
pub async fn count_events(pool: &SqlitePool, filter: &EventFilter) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM seismic_events WHERE {}", FILTER_CLAUSE);
    let row = bind_filter(sqlx::query(&sql), filter).fetch_one(pool).await?;
    Ok(row.get(0))
}

// Each optional bound is bound twice: once for the IS NULL test, once for the comparison
const FILTER_CLAUSE: &str = "(? IS NULL OR magnitude >= ?) \
                             AND (? IS NULL OR magnitude <= ?) \
                             AND (? IS NULL OR occurred_at >= ?) \
                             AND (? IS NULL OR occurred_at <= ?)";

fn bind_filter<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    filter: &EventFilter,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    let start = filter.start.as_ref().map(to_db_time);
    let end = filter.end.as_ref().map(to_db_time);

    query
        .bind(filter.min_magnitude)
        .bind(filter.min_magnitude)
        .bind(filter.max_magnitude)
        .bind(filter.max_magnitude)
        .bind(start.clone())
        .bind(start)
        .bind(end.clone())
        .bind(end)
}

pub(crate) fn event_from_row(row: &SqliteRow) -> Result<SeismicEvent> {
    let occurred_at: String = row.try_get("occurred_at")?;

    Ok(SeismicEvent {
        event_id: row.try_get("event_id")?,
        magnitude: row.try_get("magnitude")?,
        depth_km: row.try_get("depth_km")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        occurred_at: from_db_time(&occurred_at)?,
        place: row.try_get("place")?,
        impact_radius_km: row.try_get("impact_radius_km")?,
        source: row.try_get("source")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use chrono::TimeZone;

    fn event(id: &str, magnitude: f64, day: u32) -> SeismicEvent {
        SeismicEvent {
            event_id: id.to_string(),
            magnitude,
            depth_km: 10.0,
            latitude: 35.0,
            longitude: 139.0,
            occurred_at: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            place: format!("Test place {}", id),
            impact_radius_km: Some(100.0),
            source: "USGS".to_string(),
        }
    }

    async fn store(pool: &SqlitePool, e: &SeismicEvent) -> InsertOutcome {
        let mut conn = pool.acquire().await.unwrap();
        insert_event(&mut conn, e).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let pool = init_memory_pool().await.unwrap();
        let e = event("us-1", 6.1, 1);

        assert_eq!(store(&pool, &e).await, InsertOutcome::Inserted);
        assert!(event_exists(&pool, "us-1").await.unwrap());
        assert!(!event_exists(&pool, "us-2").await.unwrap());

        let loaded = load_event(&pool, "us-1").await.unwrap().unwrap();
        assert_eq!(loaded, e);
        assert!(load_event(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_reports_conflict() {
        let pool = init_memory_pool().await.unwrap();
        let e = event("us-1", 6.1, 1);

        assert_eq!(store(&pool, &e).await, InsertOutcome::Inserted);
        assert_eq!(store(&pool, &e).await, InsertOutcome::AlreadyExists);
        assert_eq!(count_events(&pool, &EventFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_ordering() {
        let pool = init_memory_pool().await.unwrap();
        for e in [event("a", 4.6, 1), event("b", 5.5, 2), event("c", 7.1, 3), event("d", 6.0, 4)] {
            store(&pool, &e).await;
        }

        let all = list_events(&pool, &EventFilter::default(), 50, 0).await.unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c", "b", "a"]);

        let filter = EventFilter {
            min_magnitude: Some(5.0),
            max_magnitude: Some(7.0),
            ..Default::default()
        };
        let ids: Vec<_> = list_events(&pool, &filter, 50, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec!["d", "b"]);
        assert_eq!(count_events(&pool, &filter).await.unwrap(), 2);

        let filter = EventFilter {
            start: Some(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()),
            end: Some(Utc.with_ymd_and_hms(2024, 3, 3, 23, 0, 0).unwrap()),
            ..Default::default()
        };
        let ids: Vec<_> = list_events(&pool, &filter, 50, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let pool = init_memory_pool().await.unwrap();
        for day in 1..=5 {
            store(&pool, &event(&format!("e{}", day), 5.0, day)).await;
        }

        let page = list_events(&pool, &EventFilter::default(), 2, 2).await.unwrap();
        let ids: Vec<_> = page.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["e3", "e2"]);
    }
}
