//! Per-country impact persistence
//!
//! List-valued fields (cities, factors, sources) are stored as JSON text.

use anyhow::Result;
use seismo_common::{DestructionLevel, ImpactAssessment, SeismicEvent, Tier};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::events::event_from_row;

/// An impact row joined with its owning event, for per-country queries
#[derive(Debug, Clone)]
pub struct CountryImpactRecord {
    pub event: SeismicEvent,
    pub impact: ImpactAssessment,
}

/// Insert one row per assessment inside the caller's transaction
pub async fn insert_impacts(
    conn: &mut SqliteConnection,
    event_id: &str,
    impacts: &[ImpactAssessment],
) -> Result<()> {
    for impact in impacts {
        sqlx::query(
            r#"
            INSERT INTO country_impacts
                (event_id, country, affected_cities, estimated_deaths, estimated_injuries,
                 economic_loss_usd, destruction_level, reasoning, contributing_factors,
                 building_code, preparedness, population_density, inferred_sources)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event_id)
        .bind(&impact.country)
        .bind(serde_json::to_string(&impact.affected_cities)?)
        .bind(impact.estimated_deaths.max(0))
        .bind(impact.estimated_injuries.max(0))
        .bind(impact.economic_loss_usd.max(0))
        .bind(impact.destruction_level.as_str())
        .bind(&impact.reasoning)
        .bind(serde_json::to_string(&impact.contributing_factors)?)
        .bind(&impact.building_code)
        .bind(impact.preparedness.as_str())
        .bind(impact.population_density.as_str())
        .bind(serde_json::to_string(&impact.inferred_sources)?)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Load all impacts for one event, in insertion order
pub async fn load_impacts(pool: &SqlitePool, event_id: &str) -> Result<Vec<ImpactAssessment>> {
    let rows = sqlx::query(
        r#"
        SELECT country, affected_cities, estimated_deaths, estimated_injuries, economic_loss_usd,
               destruction_level, reasoning, contributing_factors, building_code,
               preparedness, population_density, inferred_sources
        FROM country_impacts
        WHERE event_id = ?
        ORDER BY id
        "#,
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(impact_from_row).collect()
}

/// Impacts whose country name contains `country` (case-insensitive), newest first
pub async fn impacts_by_country(
    pool: &SqlitePool,
    country: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<CountryImpactRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT e.event_id, e.magnitude, e.depth_km, e.latitude, e.longitude, e.occurred_at,
               e.place, e.impact_radius_km, e.source,
               i.country, i.affected_cities, i.estimated_deaths, i.estimated_injuries,
               i.economic_loss_usd, i.destruction_level, i.reasoning, i.contributing_factors,
               i.building_code, i.preparedness, i.population_density, i.inferred_sources
        FROM country_impacts i
        JOIN seismic_events e ON e.event_id = i.event_id
        WHERE i.country LIKE ? ESCAPE '\'
        ORDER BY i.created_at DESC, i.id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(like_pattern(country))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(CountryImpactRecord {
                event: event_from_row(row)?,
                impact: impact_from_row(row)?,
            })
        })
        .collect()
}

/// Count impacts whose country name contains `country`
pub async fn count_impacts_by_country(pool: &SqlitePool, country: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM country_impacts WHERE country LIKE ? ESCAPE '\\'")
        .bind(like_pattern(country))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// `%text%` with LIKE wildcards in the user's text escaped
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn impact_from_row(row: &SqliteRow) -> Result<ImpactAssessment> {
    let affected_cities: String = row.try_get("affected_cities")?;
    let contributing_factors: Option<String> = row.try_get("contributing_factors")?;
    let inferred_sources: String = row.try_get("inferred_sources")?;
    let destruction_level: String = row.try_get("destruction_level")?;
    let preparedness: String = row.try_get("preparedness")?;
    let population_density: String = row.try_get("population_density")?;

    Ok(ImpactAssessment {
        country: row.try_get("country")?,
        affected_cities: serde_json::from_str(&affected_cities)?,
        estimated_deaths: row.try_get("estimated_deaths")?,
        estimated_injuries: row.try_get("estimated_injuries")?,
        economic_loss_usd: row.try_get("economic_loss_usd")?,
        destruction_level: DestructionLevel::normalize(&destruction_level),
        reasoning: row.try_get("reasoning")?,
        contributing_factors: match contributing_factors {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        },
        building_code: row.try_get("building_code")?,
        preparedness: Tier::normalize(&preparedness),
        population_density: Tier::normalize(&population_density),
        inferred_sources: serde_json::from_str(&inferred_sources)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::events::insert_event;
    use crate::db::init_memory_pool;
    use chrono::Utc;

    fn event(id: &str) -> SeismicEvent {
        SeismicEvent {
            event_id: id.to_string(),
            magnitude: 6.5,
            depth_km: 20.0,
            latitude: 14.6,
            longitude: 121.0,
            occurred_at: Utc::now(),
            place: "Luzon".to_string(),
            impact_radius_km: Some(350.0),
            source: "USGS".to_string(),
        }
    }

    fn impact(country: &str, deaths: i64) -> ImpactAssessment {
        ImpactAssessment {
            country: country.to_string(),
            affected_cities: vec!["Manila".to_string(), "Quezon City".to_string()],
            estimated_deaths: deaths,
            estimated_injuries: deaths * 3,
            economic_loss_usd: 250_000_000,
            destruction_level: DestructionLevel::Moderate,
            reasoning: Some("Magnitude 6.5 at 20km depth.".to_string()),
            contributing_factors: vec!["Magnitude 6.5".to_string()],
            building_code: Some("National Building Code of the Philippines".to_string()),
            preparedness: Tier::Medium,
            population_density: Tier::High,
            inferred_sources: vec!["PHIVOLCS".to_string()],
        }
    }

    async fn seed(pool: &SqlitePool, id: &str, impacts: &[ImpactAssessment]) {
        let mut tx = pool.begin().await.unwrap();
        insert_event(&mut tx, &event(id)).await.unwrap();
        insert_impacts(&mut tx, id, impacts).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_and_load_preserves_fields() {
        let pool = init_memory_pool().await.unwrap();
        let impacts = vec![impact("Philippines", 120), impact("Taiwan", 0)];
        seed(&pool, "ph-1", &impacts).await;

        let loaded = load_impacts(&pool, "ph-1").await.unwrap();
        assert_eq!(loaded, impacts);
        assert!(load_impacts(&pool, "other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_impacts_require_existing_event() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let result = insert_impacts(&mut conn, "ghost", &[impact("Nowhere", 1)]).await;
        assert!(result.is_err(), "foreign key should reject orphan impact");
    }

    #[tokio::test]
    async fn test_impacts_cascade_with_event() {
        let pool = init_memory_pool().await.unwrap();
        seed(&pool, "ph-1", &[impact("Philippines", 120)]).await;

        sqlx::query("DELETE FROM seismic_events WHERE event_id = ?")
            .bind("ph-1")
            .execute(&pool)
            .await
            .unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM country_impacts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_country_search_is_case_insensitive_substring() {
        let pool = init_memory_pool().await.unwrap();
        seed(&pool, "ph-1", &[impact("Philippines", 120), impact("Taiwan", 2)]).await;
        seed(&pool, "ph-2", &[impact("Philippines", 8)]).await;

        let results = impacts_by_country(&pool, "philipp", 50, 0).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.impact.country == "Philippines"));
        assert_eq!(count_impacts_by_country(&pool, "PHILIPP").await.unwrap(), 2);

        // Wildcards in user input are literal
        assert_eq!(count_impacts_by_country(&pool, "%").await.unwrap(), 0);
    }
}
