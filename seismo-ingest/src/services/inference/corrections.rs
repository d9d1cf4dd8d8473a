//! Magnitude-consistency corrections and rule-based fallback
//!
//! Both paths are deterministic functions of the event's magnitude and depth
//! (plus the record's own preparedness and density tiers for corrections).
//! Intermediate values are truncated toward zero, never rounded.

use seismo_common::{DestructionLevel, ImpactAssessment, Tier};
use tracing::{info, warn};

pub const CORRECTION_SOURCE: &str = "Magnitude-based correction applied";
pub const FALLBACK_SOURCE: &str = "Fallback estimation - AI unavailable";
pub const FALLBACK_COUNTRY: &str = "Unknown Region";

/// Magnitude at or above which an all-zero estimate is never plausible
const SIGNIFICANT_MAGNITUDE: f64 = 6.0;

/// Baseline (deaths, injuries, loss) for a corrected record
fn correction_baseline(magnitude: f64) -> (i64, i64, i64) {
    if magnitude >= 7.0 {
        let deaths = (500.0 * (magnitude - 6.0)) as i64;
        (deaths, deaths * 4, (1e9 * magnitude) as i64)
    } else if magnitude >= 6.0 {
        let deaths = (100.0 * (magnitude - 5.0)) as i64;
        (deaths, deaths * 3, (1e8 * magnitude) as i64)
    } else if magnitude >= 5.0 {
        let deaths = if magnitude < 5.5 {
            0
        } else {
            (10.0 * (magnitude - 5.0)) as i64
        };
        (deaths, (50.0 * magnitude) as i64, (1e7 * magnitude) as i64)
    } else {
        (0, (10.0 * magnitude) as i64, (1e6 * magnitude) as i64)
    }
}

fn depth_factor(depth_km: f64) -> f64 {
    if depth_km > 100.0 {
        0.5
    } else if depth_km > 70.0 {
        0.7
    } else if depth_km < 30.0 {
        1.3
    } else {
        1.0
    }
}

/// Applies to deaths and injuries only
fn preparedness_factor(tier: Tier) -> f64 {
    match tier {
        Tier::High => 0.6,
        Tier::Medium => 1.0,
        Tier::Low => 1.5,
    }
}

fn density_factor(tier: Tier) -> f64 {
    match tier {
        Tier::High => 1.5,
        Tier::Medium => 1.0,
        Tier::Low => 0.5,
    }
}

/// Whether a record is an implausible all-zero estimate
pub fn needs_correction(impact: &ImpactAssessment, magnitude: f64) -> bool {
    impact.is_all_zero()
        && (magnitude >= SIGNIFICANT_MAGNITUDE || impact.destruction_level.is_elevated())
}

/// Replace implausible all-zero estimates with magnitude-derived baselines
///
/// Records that carry any non-zero value, or that are all-zero for a small
/// event at LOW destruction, pass through untouched.
pub fn apply_corrections(impacts: &mut [ImpactAssessment], magnitude: f64, depth_km: f64) {
    for impact in impacts.iter_mut().filter(|i| needs_correction(i, magnitude)) {
        warn!(
            country = %impact.country,
            magnitude,
            level = %impact.destruction_level,
            "Model returned all-zero estimates, applying corrections"
        );

        let (base_deaths, base_injuries, base_loss) = correction_baseline(magnitude);
        let depth = depth_factor(depth_km);
        let prep = preparedness_factor(impact.preparedness);
        let density = density_factor(impact.population_density);

        impact.estimated_deaths = (base_deaths as f64 * depth * prep * density) as i64;
        impact.estimated_injuries = (base_injuries as f64 * depth * prep * density) as i64;
        impact.economic_loss_usd = (base_loss as f64 * depth * density) as i64;

        let note = format!(
            "Automatic correction applied: Base estimates adjusted for depth ({}km, factor {:.1}), \
             preparedness ({}, factor {:.1}), and density ({}, factor {:.1}).",
            depth_km, depth, impact.preparedness, prep, impact.population_density, density
        );
        impact.reasoning = Some(match impact.reasoning.take() {
            Some(existing) => format!("{} {}", existing, note),
            None => note,
        });

        if !impact.inferred_sources.iter().any(|s| s == CORRECTION_SOURCE) {
            impact.inferred_sources.push(CORRECTION_SOURCE.to_string());
        }

        info!(
            deaths = impact.estimated_deaths,
            injuries = impact.estimated_injuries,
            loss_usd = impact.economic_loss_usd,
            "Applied corrections"
        );
    }
}

/// Single-region estimate used when the model is unusable
pub fn fallback_estimation(magnitude: f64, depth_km: f64) -> Vec<ImpactAssessment> {
    info!(magnitude, depth_km, "Using fallback estimation for earthquake impact");

    let (level, deaths, injuries, loss) = if magnitude >= 7.0 {
        let deaths = (1000.0 * (magnitude - 6.0)) as i64;
        (DestructionLevel::High, deaths, deaths * 5, (1e9 * magnitude) as i64)
    } else if magnitude >= 6.0 {
        let deaths = (100.0 * (magnitude - 5.0)) as i64;
        (DestructionLevel::Moderate, deaths, deaths * 3, (1e8 * magnitude) as i64)
    } else {
        (DestructionLevel::Low, 0, (10.0 * magnitude) as i64, (1e6 * magnitude) as i64)
    };

    vec![ImpactAssessment {
        country: FALLBACK_COUNTRY.to_string(),
        affected_cities: vec!["Unknown".to_string()],
        estimated_deaths: deaths.max(0),
        estimated_injuries: injuries.max(0),
        economic_loss_usd: loss.max(0),
        destruction_level: level,
        reasoning: Some(format!(
            "Fallback estimation based on magnitude {} and depth {}km. AI model unavailable.",
            magnitude, depth_km
        )),
        contributing_factors: vec![
            format!("Magnitude {}", magnitude),
            format!("Depth {}km", depth_km),
            "Rule-based calculation".to_string(),
        ],
        building_code: None,
        preparedness: Tier::Medium,
        population_density: Tier::Medium,
        inferred_sources: vec![FALLBACK_SOURCE.to_string()],
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_impact(level: DestructionLevel, preparedness: Tier, density: Tier) -> ImpactAssessment {
        ImpactAssessment {
            country: "Testland".to_string(),
            affected_cities: vec!["Capital".to_string()],
            estimated_deaths: 0,
            estimated_injuries: 0,
            economic_loss_usd: 0,
            destruction_level: level,
            reasoning: None,
            contributing_factors: vec![],
            building_code: None,
            preparedness,
            population_density: density,
            inferred_sources: vec!["AI analysis".to_string()],
        }
    }

    #[test]
    fn test_fallback_moderate_band() {
        let result = fallback_estimation(6.2, 10.0);
        assert_eq!(result.len(), 1);

        let record = &result[0];
        assert_eq!(record.country, "Unknown Region");
        assert_eq!(record.affected_cities, vec!["Unknown"]);
        assert_eq!(record.destruction_level, DestructionLevel::Moderate);
        assert_eq!(record.estimated_deaths, 120);
        assert_eq!(record.estimated_injuries, 360);
        assert_eq!(record.economic_loss_usd, 620_000_000);
        assert_eq!(record.inferred_sources, vec![FALLBACK_SOURCE]);
        assert!(record.reasoning.as_deref().unwrap().ends_with("AI model unavailable."));
    }

    #[test]
    fn test_fallback_other_bands() {
        let high = &fallback_estimation(7.5, 10.0)[0];
        assert_eq!(high.destruction_level, DestructionLevel::High);
        assert_eq!(high.estimated_deaths, 1500);
        assert_eq!(high.estimated_injuries, 7500);
        assert_eq!(high.economic_loss_usd, 7_500_000_000);

        let low = &fallback_estimation(4.8, 10.0)[0];
        assert_eq!(low.destruction_level, DestructionLevel::Low);
        assert_eq!(low.estimated_deaths, 0);
        assert_eq!(low.estimated_injuries, 48);
        assert_eq!(low.economic_loss_usd, 4_800_000);
    }

    #[test]
    fn test_correction_high_magnitude_deep_prepared() {
        let mut impacts = vec![zero_impact(DestructionLevel::Low, Tier::High, Tier::Medium)];
        apply_corrections(&mut impacts, 7.0, 150.0);

        // base 500 deaths, 2000 injuries, 7e9 loss; depth 0.5, preparedness 0.6
        let record = &impacts[0];
        assert_eq!(record.estimated_deaths, 150);
        assert_eq!(record.estimated_injuries, 600);
        assert_eq!(record.economic_loss_usd, 3_500_000_000);
        assert!(record.inferred_sources.contains(&CORRECTION_SOURCE.to_string()));
        assert!(record.reasoning.as_deref().unwrap().starts_with("Automatic correction applied"));
    }

    #[test]
    fn test_correction_elevated_level_below_six() {
        let mut impacts = vec![zero_impact(DestructionLevel::Moderate, Tier::Medium, Tier::Low)];
        apply_corrections(&mut impacts, 5.0, 50.0);

        // base 0 deaths, 250 injuries, 5e7 loss; density 0.5
        let record = &impacts[0];
        assert_eq!(record.estimated_deaths, 0);
        assert_eq!(record.estimated_injuries, 125);
        assert_eq!(record.economic_loss_usd, 25_000_000);
    }

    #[test]
    fn test_small_low_zero_record_untouched() {
        let original = zero_impact(DestructionLevel::Low, Tier::Medium, Tier::Medium);
        let mut impacts = vec![original.clone()];
        apply_corrections(&mut impacts, 5.4, 10.0);

        assert_eq!(impacts[0], original);
    }

    #[test]
    fn test_non_zero_record_untouched() {
        let mut record = zero_impact(DestructionLevel::High, Tier::Medium, Tier::Medium);
        record.estimated_injuries = 3;
        let mut impacts = vec![record.clone()];
        apply_corrections(&mut impacts, 7.8, 10.0);

        assert_eq!(impacts[0], record);
    }

    #[test]
    fn test_corrected_significant_records_never_all_zero() {
        for tenths in 60..=95 {
            let magnitude = tenths as f64 / 10.0;
            for depth in [5.0, 50.0, 80.0, 400.0] {
                for prep in [Tier::High, Tier::Medium, Tier::Low] {
                    for density in [Tier::High, Tier::Medium, Tier::Low] {
                        let mut impacts = vec![zero_impact(DestructionLevel::Low, prep, density)];
                        apply_corrections(&mut impacts, magnitude, depth);
                        assert!(!impacts[0].is_all_zero(), "M{magnitude} depth {depth}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_existing_reasoning_and_source_marker_kept_once() {
        let mut record = zero_impact(DestructionLevel::High, Tier::Medium, Tier::Medium);
        record.reasoning = Some("Model text.".to_string());
        record.inferred_sources.push(CORRECTION_SOURCE.to_string());
        let mut impacts = vec![record];
        apply_corrections(&mut impacts, 6.5, 40.0);

        let record = &impacts[0];
        assert!(record.reasoning.as_deref().unwrap().starts_with("Model text. Automatic correction"));
        let markers = record.inferred_sources.iter().filter(|s| *s == CORRECTION_SOURCE).count();
        assert_eq!(markers, 1);
    }
}
