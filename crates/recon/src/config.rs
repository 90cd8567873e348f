use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub thresholds: DistanceThresholds,
    #[serde(default)]
    pub spec: SpecTolerance,
    #[serde(default)]
    pub units: UnitHeuristic,
    #[serde(default)]
    pub comm_drop: CommDropConfig,
}

fn default_name() -> String {
    "pole reconciliation".into()
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            thresholds: DistanceThresholds::default(),
            spec: SpecTolerance::default(),
            units: UnitHeuristic::default(),
            comm_drop: CommDropConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinate pass
// ---------------------------------------------------------------------------

/// Distance bounds for the coordinate pass, in meters.
///
/// Under `direct_m` a pairing is accepted on proximity alone. Between
/// `direct_m` and `verified_m` (inclusive) it also needs matching specs.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DistanceThresholds {
    #[serde(default = "default_direct_m")]
    pub direct_m: f64,
    #[serde(default = "default_verified_m")]
    pub verified_m: f64,
}

fn default_direct_m() -> f64 {
    1.0
}

fn default_verified_m() -> f64 {
    5.0
}

impl Default for DistanceThresholds {
    fn default() -> Self {
        Self {
            direct_m: default_direct_m(),
            verified_m: default_verified_m(),
        }
    }
}

// ---------------------------------------------------------------------------
// Spec comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SpecTolerance {
    #[serde(default = "default_height_tolerance_ft")]
    pub height_tolerance_ft: f64,
}

fn default_height_tolerance_ft() -> f64 {
    1.0
}

impl Default for SpecTolerance {
    fn default() -> Self {
        Self {
            height_tolerance_ft: default_height_tolerance_ft(),
        }
    }
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Meters-vs-feet guess for unitless heights.
///
/// A bare value inside `[meter_min, meter_max]`, or any non-integral bare
/// value, is read as meters. This misreads short poles recorded in feet
/// (a bare `20` becomes 66 ft); tune the range per dataset.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct UnitHeuristic {
    #[serde(default = "default_meter_min")]
    pub meter_min: f64,
    #[serde(default = "default_meter_max")]
    pub meter_max: f64,
}

fn default_meter_min() -> f64 {
    6.0
}

fn default_meter_max() -> f64 {
    24.0
}

impl Default for UnitHeuristic {
    fn default() -> Self {
        Self {
            meter_min: default_meter_min(),
            meter_max: default_meter_max(),
        }
    }
}

impl UnitHeuristic {
    pub fn looks_like_meters(&self, value: f64) -> bool {
        value.fract() != 0.0 || (self.meter_min..=self.meter_max).contains(&value)
    }
}

// ---------------------------------------------------------------------------
// Comm drop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CommDropConfig {
    /// Attachment owner / service-location sub-type that identifies the carrier.
    #[serde(default = "default_carrier")]
    pub carrier: String,
}

fn default_carrier() -> String {
    "Charter".into()
}

impl Default for CommDropConfig {
    fn default() -> Self {
        Self {
            carrier: default_carrier(),
        }
    }
}

impl CommDropConfig {
    pub fn is_carrier(&self, name: &str) -> bool {
        name.trim().eq_ignore_ascii_case(self.carrier.trim())
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let t = &self.thresholds;
        for (name, value) in [("direct_m", t.direct_m), ("verified_m", t.verified_m)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ReconError::ConfigValidation(format!(
                    "thresholds.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if t.direct_m > t.verified_m {
            return Err(ReconError::ConfigValidation(format!(
                "thresholds.direct_m ({}) exceeds thresholds.verified_m ({})",
                t.direct_m, t.verified_m
            )));
        }

        let tol = self.spec.height_tolerance_ft;
        if !tol.is_finite() || tol < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "spec.height_tolerance_ft must be a non-negative number, got {tol}"
            )));
        }

        let u = &self.units;
        if !u.meter_min.is_finite() || !u.meter_max.is_finite() || u.meter_min > u.meter_max {
            return Err(ReconError::ConfigValidation(format!(
                "units range [{}, {}] is invalid",
                u.meter_min, u.meter_max
            )));
        }

        if self.comm_drop.carrier.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "comm_drop.carrier must not be empty".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
