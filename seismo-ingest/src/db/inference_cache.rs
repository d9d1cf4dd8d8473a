//! Inference response cache
//!
//! Keyed by a SHA-256 hash of the request parameters. Entries hold the
//! validated, corrected impact list as JSON and expire after a TTL.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use seismo_common::ImpactAssessment;
use sha2::{Digest, Sha256};
use sqlx::SqliteExecutor;

use super::to_db_time;

/// Hex SHA-256 of a canonical request string
pub fn request_hash(canonical_request: &str) -> String {
    format!("{:x}", Sha256::digest(canonical_request.as_bytes()))
}

/// Look up a live (unexpired) cache entry
///
/// Takes any executor so the lookup can run inside the caller's transaction.
pub async fn get_cached<'e, E: SqliteExecutor<'e>>(
    executor: E,
    request_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<Vec<ImpactAssessment>>> {
    let response: Option<String> = sqlx::query_scalar(
        r#"
        SELECT response FROM inference_cache
        WHERE request_hash = ? AND (expires_at IS NULL OR expires_at > ?)
        "#,
    )
    .bind(request_hash)
    .bind(to_db_time(&now))
    .fetch_optional(executor)
    .await?;

    match response {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Store (or replace) the response for a request hash
pub async fn store<'e, E: SqliteExecutor<'e>>(
    executor: E,
    request_hash: &str,
    impacts: &[ImpactAssessment],
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO inference_cache (request_hash, response, created_at, expires_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(request_hash) DO UPDATE SET
            response = excluded.response,
            created_at = excluded.created_at,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(request_hash)
    .bind(serde_json::to_string(impacts)?)
    .bind(to_db_time(&now))
    .bind(to_db_time(&(now + ttl)))
    .execute(executor)
    .await?;

    Ok(())
}

/// Delete expired entries, returning how many were removed
pub async fn purge_expired<'e, E: SqliteExecutor<'e>>(executor: E, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM inference_cache WHERE expires_at IS NOT NULL AND expires_at <= ?")
        .bind(to_db_time(&now))
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
