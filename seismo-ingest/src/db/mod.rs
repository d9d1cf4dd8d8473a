//! Database access for seismo-ingest
//!
//! SQLite storage for the three record kinds the pipeline writes: events,
//! per-country impacts (cascade-deleted with their event) and the advisory
//! inference cache.

pub mod events;
pub mod impacts;
pub mod inference_cache;
pub mod stats;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Initialize database connection pool
///
/// Creates the database file (and parent directories) when missing, enables
/// foreign keys on every connection and creates tables.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let db_url = format!("sqlite://{}", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("Failed to open database")?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Single connection so every query sees the same database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seismic_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL UNIQUE,
            magnitude REAL NOT NULL,
            depth_km REAL NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            occurred_at TEXT NOT NULL,
            place TEXT NOT NULL DEFAULT '',
            impact_radius_km REAL,
            source TEXT NOT NULL DEFAULT 'USGS',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_occurred_at ON seismic_events(occurred_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_magnitude ON seismic_events(magnitude)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS country_impacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL REFERENCES seismic_events(event_id) ON DELETE CASCADE,
            country TEXT NOT NULL,
            affected_cities TEXT NOT NULL DEFAULT '[]',
            estimated_deaths INTEGER NOT NULL DEFAULT 0 CHECK (estimated_deaths >= 0),
            estimated_injuries INTEGER NOT NULL DEFAULT 0 CHECK (estimated_injuries >= 0),
            economic_loss_usd INTEGER NOT NULL DEFAULT 0 CHECK (economic_loss_usd >= 0),
            destruction_level TEXT NOT NULL DEFAULT 'LOW'
                CHECK (destruction_level IN ('LOW', 'MODERATE', 'HIGH', 'CATASTROPHIC')),
            reasoning TEXT,
            contributing_factors TEXT,
            building_code TEXT,
            preparedness TEXT NOT NULL DEFAULT 'MEDIUM',
            population_density TEXT NOT NULL DEFAULT 'MEDIUM',
            inferred_sources TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_impacts_event_country ON country_impacts(event_id, country)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_impacts_country ON country_impacts(country)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inference_cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_hash TEXT NOT NULL UNIQUE,
            response TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON inference_cache(expires_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (seismic_events, country_impacts, inference_cache)");

    Ok(())
}

/// Format a timestamp for storage
///
/// Fixed-width RFC 3339 UTC (`2024-01-01T00:00:00.000Z`) so text comparison
/// orders the same as time.
pub fn to_db_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub fn from_db_time(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid stored timestamp: {}", value))?
        .with_timezone(&Utc))
}
