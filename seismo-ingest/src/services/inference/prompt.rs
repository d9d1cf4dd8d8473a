//! Prompt construction for impact assessment

use super::{HistoricalContext, InferenceRequest};

const SYSTEM_MESSAGE: &str = "\
You are an expert seismologist and disaster impact assessment specialist with deep knowledge of:
- Global seismic codes and building standards
- Historical earthquake impacts worldwide
- Population density and urban planning
- Infrastructure quality by country/region

Your task is to analyze earthquake data with REAL-WORLD context and provide detailed, realistic \
impact assessments with EXPLICIT REASONING.

You must respond ONLY with a valid JSON array.";

const MAGNITUDE_REFERENCE: &str = "\
## MAGNITUDE REFERENCE (use as baseline, then adjust):
- **Mag 4.0-4.9**: Minor damage, 0 deaths, 10-100 injuries, $1-5M damages → \"LOW\"
- **Mag 5.0-5.9**: Light damage, 0-50 deaths, 100-500 injuries, $10-50M → \"LOW\" or \"MODERATE\"
- **Mag 6.0-6.9**: Moderate damage, 50-500 deaths, 500-3000 injuries, $100-500M → \"MODERATE\"
- **Mag 7.0-7.9**: Severe damage, 500-5000 deaths, 3000-20000 injuries, $1-10B → \"HIGH\"
- **Mag 8.0+**: Catastrophic, 5000+ deaths, 20000+ injuries, $10B+ → \"CATASTROPHIC\"
";

const ADJUSTMENT_FACTORS: &str = "\
## ADJUSTMENT FACTORS (apply to baseline):
**Depth Impact**:
- Shallow (<30km): +30% casualties (energy concentrates at surface)
- Medium (30-70km): baseline
- Deep (>70km): -30 to -50% casualties (energy dissipates)

**Population Density**:
- Rural/Low: -50% casualties
- Medium: baseline
- High/Urban: +50% casualties

**Building Codes & Preparedness** (use YOUR knowledge of each country):
- HIGH (e.g., Japan, Chile, NZ, USA-CA): -60 to -70% casualties
- MEDIUM (e.g., Philippines, Mexico, Turkey): -20 to -40% casualties
- LOW (e.g., Nepal, Haiti, poor rural areas): +40 to +50% casualties

**Time of Day** (assume worst case if unknown):
- Business hours in urban area: +20% casualties
";

/// Persona and output-format instruction
pub fn system_message() -> &'static str {
    SYSTEM_MESSAGE
}

/// Event-specific instruction: parameters, reference table, schema and rules
pub fn user_message(request: &InferenceRequest) -> String {
    let place = if request.place.trim().is_empty() {
        "Unknown"
    } else {
        request.place.as_str()
    };
    let magnitude = request.magnitude;
    let depth = request.depth_km;
    let radius = request.radius_km;

    let mut prompt = format!(
        "## EARTHQUAKE TO ANALYZE:

**Location**: {place}
**Coordinates**: Latitude {lat}, Longitude {lon}
**Magnitude**: {magnitude}
**Depth**: {depth} km
**Impact Radius**: {radius} km

",
        lat = request.latitude,
        lon = request.longitude,
    );

    if let Some(context) = &request.historical_context {
        prompt.push_str(&historical_section(context));
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "## YOUR TASK (use YOUR knowledge of global seismology):
1. Identify ALL countries and major cities within {radius}km radius
2. For EACH affected country, provide:
   - Realistic casualty estimates (deaths, injuries)
   - Economic damage estimates (USD)
   - Destruction level assessment
   - **DETAILED REASONING** explaining your estimates

"
    ));

    prompt.push_str(MAGNITUDE_REFERENCE);
    prompt.push('\n');
    prompt.push_str(ADJUSTMENT_FACTORS);
    prompt.push('\n');

    prompt.push_str(&format!(
        r#"## RESPONSE FORMAT (MANDATORY JSON structure):
Respond with a JSON array. For EACH affected country, include ALL fields below:

[
  {{
    "country": "Country name",
    "affected_cities": ["City1", "City2"],
    "estimated_deaths": <number based on YOUR analysis>,
    "estimated_injuries": <number based on YOUR analysis>,
    "economic_loss_usd": <number in USD>,
    "destruction_level": "<LOW|MODERATE|HIGH|CATASTROPHIC>",
    "building_code": "<Description of building code level for this country>",
    "reasoning": "CRITICAL: Start with 'Magnitude {magnitude} at {depth}km depth.' Then explain YOUR calculation step by step using the ACTUAL earthquake parameters provided above. Show depth adjustment, preparedness adjustment, density adjustment with actual numbers and calculations.",
    "contributing_factors": [
      "Magnitude <ACTUAL VALUE> - <your assessment>",
      "Depth <ACTUAL VALUE>km - <your assessment>",
      "<other factors YOU identify>"
    ],
    "inferred_sources": ["<data sources YOU used>"],
    "preparedness": "<HIGH|MEDIUM|LOW>",
    "population_density": "<HIGH|MEDIUM|LOW>"
  }}
]

## CRITICAL RULES:
1. **USE THE ACTUAL EARTHQUAKE DATA PROVIDED ABOVE** - Magnitude {magnitude}, Depth {depth}km, Location {place}
2. **NEVER copy example values** - Calculate based on the ACTUAL parameters
3. **NEVER put 0 for all estimates if mag >= 6.0**
4. **ALWAYS provide detailed reasoning** - show your calculation steps using the ACTUAL magnitude and depth
5. **Use YOUR knowledge** of that country's infrastructure, historical earthquakes, and preparedness
6. **Reference historical earthquakes** in that region when applicable (e.g., "Similar to X earthquake in Y year")
7. **Be specific in contributing_factors** - list exact factors with ACTUAL values (e.g., "Magnitude {magnitude}")
8. **destruction_level** must be: "LOW", "MODERATE", "HIGH", or "CATASTROPHIC" (all caps)
9. **building_code**: Describe the building code level for that specific country
10. Respond ONLY with the JSON array, no markdown, no extra text

Analyze now:"#
    ));

    prompt
}

fn historical_section(context: &HistoricalContext) -> String {
    let mut section = String::from("## HISTORICAL CONTEXT (previously assessed earthquakes in this region):\n");

    if let Some(summary) = &context.summary {
        section.push_str(summary);
        section.push('\n');
    }
    for line in &context.prior_events {
        section.push_str(&format!("- {}\n", line));
    }

    section.push_str("Use these as calibration, not as a template.\n");
    section
}
