//! Model output parsing and validation
//!
//! The model is asked for a bare JSON array but routinely wraps it in prose
//! or markdown fences, uses the wrong types, or drops fields. Parsing goes
//! through [`RawImpact`], where every field is an untyped optional value, and
//! only then into [`ImpactAssessment`] with explicit coercion and defaults.
//! Keys are accepted in English or with the Spanish labels older prompts used.

use serde::Deserialize;
use serde_json::Value;
use seismo_common::{DestructionLevel, ImpactAssessment, Tier};
use tracing::{debug, info, warn};

pub const DEFAULT_SOURCES: &str = "AI analysis";
pub const DEFAULT_FACTORS: &str = "Standard seismic analysis";

/// One array element as the model produced it
#[derive(Debug, Default, Deserialize)]
pub struct RawImpact {
    #[serde(alias = "pais")]
    pub country: Option<Value>,
    #[serde(alias = "ciudades_afectadas")]
    pub affected_cities: Option<Value>,
    #[serde(alias = "muertes_estimadas")]
    pub estimated_deaths: Option<Value>,
    #[serde(alias = "heridos_estimados")]
    pub estimated_injuries: Option<Value>,
    #[serde(alias = "perdidas_monetarias_usd")]
    pub economic_loss_usd: Option<Value>,
    #[serde(alias = "nivel_destruccion")]
    pub destruction_level: Option<Value>,
    #[serde(alias = "razonamiento")]
    pub reasoning: Option<Value>,
    #[serde(alias = "factores_considerados")]
    pub contributing_factors: Option<Value>,
    #[serde(alias = "codigo_construccion")]
    pub building_code: Option<Value>,
    #[serde(alias = "nivel_preparacion_sismica")]
    pub preparedness: Option<Value>,
    #[serde(alias = "densidad_poblacional")]
    pub population_density: Option<Value>,
    #[serde(alias = "fuentes_inferidas")]
    pub inferred_sources: Option<Value>,
}

/// Why a raw element was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Missing(&'static str),
    NotNumeric(&'static str),
}

impl RawImpact {
    /// Validate and coerce into a canonical assessment
    pub fn into_assessment(self) -> Result<ImpactAssessment, RejectReason> {
        let country = match self.country {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(RejectReason::Missing("country")),
        };
        let affected_cities = self
            .affected_cities
            .map(string_list)
            .ok_or(RejectReason::Missing("affected_cities"))?;
        let estimated_deaths = required_count(self.estimated_deaths, "estimated_deaths")?;
        let estimated_injuries = required_count(self.estimated_injuries, "estimated_injuries")?;
        let economic_loss_usd = required_count(self.economic_loss_usd, "economic_loss_usd")?;

        let destruction_level = match self.destruction_level {
            None | Some(Value::Null) => return Err(RejectReason::Missing("destruction_level")),
            Some(Value::String(raw)) => DestructionLevel::parse(&raw).unwrap_or_else(|| {
                warn!(level = %raw, "Unrecognized destruction level, defaulting to LOW");
                DestructionLevel::Low
            }),
            Some(other) => {
                warn!(level = %other, "Non-text destruction level, defaulting to LOW");
                DestructionLevel::Low
            }
        };

        Ok(ImpactAssessment {
            country,
            affected_cities,
            estimated_deaths,
            estimated_injuries,
            economic_loss_usd,
            destruction_level,
            reasoning: optional_text(self.reasoning),
            contributing_factors: list_or_default(self.contributing_factors, DEFAULT_FACTORS),
            building_code: optional_text(self.building_code),
            preparedness: tier(self.preparedness),
            population_density: tier(self.population_density),
            inferred_sources: list_or_default(self.inferred_sources, DEFAULT_SOURCES),
        })
    }
}

/// Slice between the first `[` and the last `]`, if both exist in order
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse generated text into validated assessments
///
/// Returns an empty list when no array can be found or decoded; invalid
/// elements are dropped individually.
pub fn parse_impacts(text: &str) -> Vec<ImpactAssessment> {
    let Some(json_text) = extract_json_array(text) else {
        warn!("No JSON array found in model response");
        debug!(raw = %text, "Raw model response");
        return Vec::new();
    };

    let elements: Vec<Value> = match serde_json::from_str(json_text) {
        Ok(elements) => elements,
        Err(e) => {
            warn!(error = %e, "Model response is not a valid JSON array");
            debug!(raw = %text, "Raw model response");
            return Vec::new();
        }
    };

    let total = elements.len();
    let validated: Vec<ImpactAssessment> = elements
        .into_iter()
        .filter_map(|element| {
            let raw: RawImpact = match serde_json::from_value(element) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "Impact entry is not an object");
                    return None;
                }
            };
            match raw.into_assessment() {
                Ok(impact) => Some(impact),
                Err(reason) => {
                    warn!(?reason, "Dropping invalid impact entry");
                    None
                }
            }
        })
        .collect();

    info!(valid = validated.len(), total, "Parsed impact assessments from model");
    validated
}

/// Non-negative integer from a number or numeric string; floats truncate
fn coerce_count(value: &Value) -> Option<i64> {
    let number = match value {
        Value::Number(n) => n.as_i64().map(|i| i as f64).or_else(|| n.as_f64())?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some((number.trunc() as i64).max(0))
}

fn required_count(value: Option<Value>, field: &'static str) -> Result<i64, RejectReason> {
    match value {
        None | Some(Value::Null) => Err(RejectReason::Missing(field)),
        Some(v) => coerce_count(&v).ok_or(RejectReason::NotNumeric(field)),
    }
}

fn scalar_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Arrays map element-wise; any scalar becomes a one-element list
fn string_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.into_iter().filter(|v| !v.is_null()).map(scalar_text).collect(),
        Value::Null => Vec::new(),
        other => vec![scalar_text(other)],
    }
}

fn list_or_default(value: Option<Value>, default: &str) -> Vec<String> {
    match value {
        None | Some(Value::Null) => vec![default.to_string()],
        Some(v) => string_list(v),
    }
}

fn optional_text(value: Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => Some(scalar_text(v)).filter(|s| !s.trim().is_empty()),
    }
}

fn tier(value: Option<Value>) -> Tier {
    match value {
        Some(Value::String(s)) => Tier::normalize(&s),
        _ => Tier::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_array_from_prose() {
        let text = "Here is the analysis:\n```json\n[{\"a\": [1, 2]}]\n```\nDone.";
        assert_eq!(extract_json_array(text), Some("[{\"a\": [1, 2]}]"));
        assert_eq!(extract_json_array("no array here"), None);
        assert_eq!(extract_json_array("] backwards ["), None);
    }

    #[test]
    fn test_parse_english_keys() {
        let text = r#"[{
            "country": "Japan",
            "affected_cities": ["Sendai", "Tokyo"],
            "estimated_deaths": 120,
            "estimated_injuries": 900.7,
            "economic_loss_usd": "2500000000",
            "destruction_level": "high",
            "building_code": "Building Standard Law",
            "reasoning": "Magnitude 7.1 at 24km depth.",
            "contributing_factors": ["Magnitude 7.1"],
            "inferred_sources": ["JMA"],
            "preparedness": "HIGH",
            "population_density": "high"
        }]"#;

        let impacts = parse_impacts(text);
        assert_eq!(impacts.len(), 1);

        let japan = &impacts[0];
        assert_eq!(japan.country, "Japan");
        assert_eq!(japan.affected_cities, vec!["Sendai", "Tokyo"]);
        assert_eq!(japan.estimated_deaths, 120);
        assert_eq!(japan.estimated_injuries, 900);
        assert_eq!(japan.economic_loss_usd, 2_500_000_000);
        assert_eq!(japan.destruction_level, DestructionLevel::High);
        assert_eq!(japan.preparedness, Tier::High);
        assert_eq!(japan.population_density, Tier::High);
        assert_eq!(japan.inferred_sources, vec!["JMA"]);
    }

    #[test]
    fn test_parse_spanish_labels_and_coercions() {
        let text = r#"[{
            "pais": "Perú",
            "ciudades_afectadas": "Lima",
            "muertes_estimadas": 3,
            "heridos_estimados": -5,
            "perdidas_monetarias_usd": 1e7,
            "nivel_destruccion": "Moderado ",
            "fuentes_inferidas": "IGP",
            "nivel_preparacion_sismica": "Baja",
            "densidad_poblacional": "Media"
        }]"#;

        let impacts = parse_impacts(text);
        assert_eq!(impacts.len(), 1);

        let peru = &impacts[0];
        assert_eq!(peru.country, "Perú");
        assert_eq!(peru.affected_cities, vec!["Lima"]);
        assert_eq!(peru.estimated_injuries, 0, "negative clamps to zero");
        assert_eq!(peru.economic_loss_usd, 10_000_000);
        assert_eq!(peru.destruction_level, DestructionLevel::Moderate);
        assert_eq!(peru.inferred_sources, vec!["IGP"]);
        assert_eq!(peru.contributing_factors, vec![DEFAULT_FACTORS]);
        assert_eq!(peru.preparedness, Tier::Low);
        assert_eq!(peru.population_density, Tier::Medium);
        assert!(peru.reasoning.is_none());
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let text = r#"[{"country": "Fiji", "affected_cities": [], "estimated_deaths": 0,
                        "estimated_injuries": 0, "economic_loss_usd": 0, "destruction_level": "SEVERE"}]"#;

        let impacts = parse_impacts(text);
        assert_eq!(impacts[0].destruction_level, DestructionLevel::Low);
        assert_eq!(impacts[0].inferred_sources, vec![DEFAULT_SOURCES]);
        assert_eq!(impacts[0].contributing_factors, vec![DEFAULT_FACTORS]);
        assert_eq!(impacts[0].preparedness, Tier::Medium);
    }

    #[test]
    fn test_invalid_elements_dropped_individually() {
        let text = r#"[
            {"country": "A", "affected_cities": [], "estimated_deaths": 1, "estimated_injuries": 1,
             "economic_loss_usd": 1, "destruction_level": "LOW"},
            {"country": "B", "affected_cities": [], "estimated_injuries": 1,
             "economic_loss_usd": 1, "destruction_level": "LOW"},
            {"country": "C", "affected_cities": [], "estimated_deaths": "many", "estimated_injuries": 1,
             "economic_loss_usd": 1, "destruction_level": "LOW"},
            {"affected_cities": [], "estimated_deaths": 1, "estimated_injuries": 1,
             "economic_loss_usd": 1, "destruction_level": "LOW"},
            "not an object"
        ]"#;

        let countries: Vec<_> = parse_impacts(text).into_iter().map(|i| i.country).collect();
        assert_eq!(countries, vec!["A"]);
    }

    #[test]
    fn test_reject_reasons() {
        let raw = RawImpact {
            country: Some(Value::from("X")),
            affected_cities: Some(Value::from("Y")),
            estimated_deaths: Some(Value::from("abc")),
            ..Default::default()
        };
        assert_eq!(raw.into_assessment(), Err(RejectReason::NotNumeric("estimated_deaths")));

        let raw = RawImpact::default();
        assert_eq!(raw.into_assessment(), Err(RejectReason::Missing("country")));
    }

    #[test]
    fn test_unparseable_text_is_empty() {
        assert!(parse_impacts("The model is overloaded, try later.").is_empty());
        assert!(parse_impacts("[not json]").is_empty());
        assert!(parse_impacts("{\"country\": \"X\"}").is_empty());
    }
}
