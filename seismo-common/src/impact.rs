//! Canonical impact assessment types
//!
//! Destruction levels and qualitative tiers arrive from the language model as
//! free text (English names or the Spanish labels used in the prompt, any
//! casing, stray whitespace). Everything downstream of validation works with
//! the enums below.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal severity tag for one country's damage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestructionLevel {
    Low,
    Moderate,
    High,
    Catastrophic,
}

impl DestructionLevel {
    /// Canonical uppercase label, as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            DestructionLevel::Low => "LOW",
            DestructionLevel::Moderate => "MODERATE",
            DestructionLevel::High => "HIGH",
            DestructionLevel::Catastrophic => "CATASTROPHIC",
        }
    }

    /// Parse a recognized label, returning `None` for anything else
    ///
    /// Input is trimmed and uppercased first, so `"bajo"`, `"Bajo"` and
    /// `"BAJO "` all map to [`DestructionLevel::Low`].
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "LOW" | "BAJO" => Some(DestructionLevel::Low),
            "MODERATE" | "MODERADO" => Some(DestructionLevel::Moderate),
            "HIGH" | "ALTO" => Some(DestructionLevel::High),
            "CATASTROPHIC" | "CATASTROFICO" | "CATASTRÓFICO" => Some(DestructionLevel::Catastrophic),
            _ => None,
        }
    }

    /// Normalize free text to a canonical level, defaulting to LOW
    pub fn normalize(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(DestructionLevel::Low)
    }

    /// MODERATE and above: zero-casualty estimates are implausible at this level
    pub fn is_elevated(&self) -> bool {
        *self >= DestructionLevel::Moderate
    }
}

impl Default for DestructionLevel {
    fn default() -> Self {
        DestructionLevel::Low
    }
}

impl fmt::Display for DestructionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative HIGH/MEDIUM/LOW modifier (seismic preparedness, population density)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::High => "HIGH",
            Tier::Medium => "MEDIUM",
            Tier::Low => "LOW",
        }
    }

    /// Normalize free text to a tier, defaulting to MEDIUM
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "HIGH" | "ALTA" | "ALTO" => Tier::High,
            "LOW" | "BAJA" | "BAJO" => Tier::Low,
            _ => Tier::Medium,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Medium
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One country's estimated damage from one earthquake
///
/// Produced by the inference step (model output after validation and
/// correction, or the rule-based fallback) and persisted one row per country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAssessment {
    pub country: String,
    pub affected_cities: Vec<String>,
    /// Non-negative
    pub estimated_deaths: i64,
    /// Non-negative
    pub estimated_injuries: i64,
    /// Non-negative, USD
    pub economic_loss_usd: i64,
    pub destruction_level: DestructionLevel,
    pub reasoning: Option<String>,
    pub contributing_factors: Vec<String>,
    pub building_code: Option<String>,
    pub preparedness: Tier,
    pub population_density: Tier,
    pub inferred_sources: Vec<String>,
}

impl ImpactAssessment {
    /// True when no casualties and no losses were estimated
    pub fn is_all_zero(&self) -> bool {
        self.estimated_deaths == 0 && self.estimated_injuries == 0 && self.economic_loss_usd == 0
    }
}
