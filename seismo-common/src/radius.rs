//! Seismic impact radius model
//!
//! Empirical magnitude/depth relationships used to size the region handed to
//! the impact assessment step:
//!
//! - Base radius: `10^(0.5·M − 0.8)` km (each magnitude unit scales the radius by ~10^0.5)
//! - Depth factor: shallow hypocenters spread more energy at the surface,
//!   very deep ones less
//! - Magnitude band multiplier: great earthquakes reach further, minor ones less
//!
//! Every function here is pure and deterministic. Finite input always yields a
//! finite output inside [`MIN_RADIUS_KM`, `MAX_RADIUS_KM`].

use serde::{Deserialize, Serialize};

/// Lower bound on any reported impact radius
pub const MIN_RADIUS_KM: f64 = 10.0;

/// Upper bound on any reported impact radius (continental scale)
pub const MAX_RADIUS_KM: f64 = 5000.0;

/// Depth above which a hypocenter counts as shallow
const SHALLOW_DEPTH_KM: f64 = 70.0;

/// Depth below which a hypocenter counts as very deep
const DEEP_DEPTH_KM: f64 = 300.0;

/// Concentric damage zones around the epicenter, in kilometers
///
/// Loosely modelled on Modified Mercalli intensity bands: each zone is a fixed
/// fraction of the felt radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityZones {
    /// Catastrophic damage (20% of felt radius)
    pub extreme: f64,
    /// Severe structural damage (40%)
    pub severe: f64,
    /// Moderate damage (60%)
    pub moderate: f64,
    /// Light damage, strongly felt (80%)
    pub light: f64,
    /// Area where the earthquake is felt
    pub felt: f64,
}

/// Estimate the impact radius in kilometers for a magnitude and hypocenter depth
///
/// Result is clamped to [10, 5000] km and rounded to 2 decimal places.
///
/// # Examples
/// ```
/// use seismo_common::radius::estimate;
///
/// // Shallow M7.5: 10^2.95 × 1.6 (depth) × 1.2 (band)
/// assert!((estimate(7.5, 10.0) - 1711.2).abs() < 0.01);
///
/// // Tiny events never report less than the floor
/// assert_eq!(estimate(2.0, 600.0), 10.0);
/// ```
pub fn estimate(magnitude: f64, depth_km: f64) -> f64 {
    let magnitude = finite_or_zero(magnitude);
    let depth_km = finite_or_zero(depth_km);

    let base_radius = 10f64.powf(0.5 * magnitude - 0.8);
    let radius = base_radius * depth_factor(depth_km) * magnitude_multiplier(magnitude);

    let bounded = if radius.is_nan() {
        MIN_RADIUS_KM
    } else {
        radius.clamp(MIN_RADIUS_KM, MAX_RADIUS_KM)
    };

    (bounded * 100.0).round() / 100.0
}

/// Derive concentric damage zones from the felt radius
pub fn intensity_zones(magnitude: f64, depth_km: f64) -> IntensityZones {
    let felt = estimate(magnitude, depth_km);

    IntensityZones {
        extreme: felt * 0.2,
        severe: felt * 0.4,
        moderate: felt * 0.6,
        light: felt * 0.8,
        felt,
    }
}

/// Estimate radiated seismic energy in joules
///
/// Gutenberg-Richter energy relation: `log10(E) = 1.5·M + 4.8`
pub fn energy_joules(magnitude: f64) -> f64 {
    10f64.powf(1.5 * magnitude + 4.8)
}

fn depth_factor(depth_km: f64) -> f64 {
    if depth_km < SHALLOW_DEPTH_KM {
        1.0 + (SHALLOW_DEPTH_KM - depth_km) / 100.0
    } else if depth_km > DEEP_DEPTH_KM {
        0.5 + (700.0 - depth_km) / 800.0
    } else {
        1.0
    }
}

fn magnitude_multiplier(magnitude: f64) -> f64 {
    if magnitude >= 8.0 {
        1.5
    } else if magnitude >= 7.0 {
        1.2
    } else if magnitude < 5.0 {
        0.7
    } else {
        1.0
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 0.01,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_regression_fixture_shallow_m75() {
        assert_close(estimate(7.5, 10.0), 1711.2);
    }

    #[test]
    fn test_known_values() {
        assert_close(estimate(7.0, 10.0), 962.28);
        assert_close(estimate(7.0, 500.0), 451.07);
        assert_close(estimate(6.0, 35.0), 213.96);
        assert_close(estimate(5.0, 150.0), 50.12);
        assert_close(estimate(4.0, 100.0), 11.09);
        assert_close(estimate(8.0, 20.0), 3566.01);
    }

    #[test]
    fn test_shallow_exceeds_deep_for_equal_magnitude() {
        assert!(estimate(7.0, 10.0) > estimate(7.0, 500.0));
    }

    #[test]
    fn test_clamped_to_bounds() {
        assert_eq!(estimate(3.0, 100.0), MIN_RADIUS_KM);
        assert_eq!(estimate(9.5, 0.0), MAX_RADIUS_KM);
        assert_eq!(estimate(f64::INFINITY, 10.0), MAX_RADIUS_KM);
        assert_eq!(estimate(f64::NAN, f64::NAN), MIN_RADIUS_KM);
    }

    #[test]
    fn test_bounded_for_realistic_range() {
        let mut magnitude = 4.0;
        while magnitude <= 10.0 {
            for depth in [0.0, 15.0, 69.9, 70.0, 150.0, 300.0, 301.0, 700.0] {
                let r = estimate(magnitude, depth);
                assert!((MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&r), "M{magnitude} d{depth} -> {r}");
            }
            magnitude += 0.1;
        }
    }

    #[test]
    fn test_monotonic_within_magnitude_band() {
        let bands = [(4.0, 4.9), (5.0, 6.9), (7.0, 7.9), (8.0, 9.5)];

        for (low, high) in bands {
            for depth in [10.0, 100.0, 450.0] {
                let mut previous = estimate(low, depth);
                let mut magnitude = low + 0.1;
                while magnitude <= high + 1e-9 {
                    let current = estimate(magnitude, depth);
                    assert!(current >= previous, "M{magnitude} at {depth}km decreased");
                    previous = current;
                    magnitude += 0.1;
                }
            }
        }
    }

    #[test]
    fn test_depth_factor_boundaries() {
        assert_close(depth_factor(0.0), 1.7);
        assert_close(depth_factor(70.0), 1.0);
        assert_close(depth_factor(300.0), 1.0);
        assert_close(depth_factor(700.0), 0.5);
    }

    #[test]
    fn test_intensity_zones_are_fractions_of_felt_radius() {
        let zones = intensity_zones(6.5, 20.0);
        let felt = estimate(6.5, 20.0);

        assert_eq!(zones.felt, felt);
        assert_close(zones.extreme, felt * 0.2);
        assert_close(zones.severe, felt * 0.4);
        assert_close(zones.moderate, felt * 0.6);
        assert_close(zones.light, felt * 0.8);
        assert!(zones.extreme < zones.severe && zones.severe < zones.moderate);
    }

    #[test]
    fn test_energy_release() {
        // M6: 10^13.8 J
        let energy = energy_joules(6.0);
        assert!((energy / 6.309_573_444_801_943e13 - 1.0).abs() < 1e-9);

        // One magnitude unit is ~31.6x more energy
        let ratio = energy_joules(7.0) / energy_joules(6.0);
        assert!((ratio - 10f64.powf(1.5)).abs() < 1e-6);
    }
}
