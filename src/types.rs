//! Core data types for the biofilter clustering pipeline.
//!
//! ## Data Flow
//!
//! ```text
//! RawReading ─► EngineeredVector ─► NormalizedVector ─► ProjectedPoint ─► SampleRecord
//!   (6 raw)        (9 fields)          (9, z-score)         (2-D PCA)      (+ cluster, time)
//! ```
//!
//! Field order in [`EngineeredVector`] is load-bearing: the normalizer and
//! projector coefficients are stored positionally and indexed by
//! [`FEATURE_NAMES`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of engineered features fed to the normalizer.
pub const NUM_FEATURES: usize = 9;

/// Number of projected dimensions (principal components).
pub const NUM_COMPONENTS: usize = 2;

/// Feature names in positional order (matches [`EngineeredVector::to_array`]).
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    // Raw sensor channels
    "pm25",
    "co2",
    "so2",
    "moss_humidity",
    "pump_activity",
    "solar_power",
    // Derived
    "pm25_rate",
    "moss_dryness",
    "activity_ratio",
];

// ============================================================================
// Validation Errors
// ============================================================================

/// Reasons a raw reading is rejected before it reaches any pipeline stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Field {0} is not numeric")]
    NotNumeric(&'static str),

    #[error("Field {field} is not finite: {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("Expected a JSON object with sensor fields")]
    NotAnObject,

    /// Finite input that still overflows once normalized and projected.
    #[error("Reading out of range: projects to ({x}, {y})")]
    OutOfRange { x: f64, y: f64 },
}

// ============================================================================
// Raw Reading
// ============================================================================

/// One periodic reading from the biofilter sensor array.
///
/// Values may arrive negative from noisy sensors; [`RawReading::clamped`]
/// floors them at zero before any feature is derived. Missing fields are a
/// validation error, never a silent zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Particulate density (PM2.5, µg/m³)
    #[serde(alias = "PM25", alias = "PM2.5")]
    pub pm25: f64,
    /// CO₂ concentration (ppm)
    #[serde(alias = "CO2")]
    pub co2: f64,
    /// SO₂ concentration (ppb)
    #[serde(alias = "SO2")]
    pub so2: f64,
    /// Moss substrate humidity (%)
    #[serde(alias = "Moss_Humidity")]
    pub moss_humidity: f64,
    /// Pump activity level
    #[serde(alias = "Pump_Activity")]
    pub pump_activity: f64,
    /// Solar panel power (W)
    #[serde(alias = "Solar_Power")]
    pub solar_power: f64,
}

/// Accepted JSON keys for each raw field, canonical name first.
const RAW_FIELD_KEYS: [(&str, &[&str]); 6] = [
    ("pm25", &["pm25", "PM25", "PM2.5"]),
    ("co2", &["co2", "CO2"]),
    ("so2", &["so2", "SO2"]),
    ("moss_humidity", &["moss_humidity", "Moss_Humidity"]),
    ("pump_activity", &["pump_activity", "Pump_Activity"]),
    ("solar_power", &["solar_power", "Solar_Power"]),
];

impl RawReading {
    pub fn new(
        pm25: f64,
        co2: f64,
        so2: f64,
        moss_humidity: f64,
        pump_activity: f64,
        solar_power: f64,
    ) -> Self {
        Self {
            pm25,
            co2,
            so2,
            moss_humidity,
            pump_activity,
            solar_power,
        }
    }

    /// Raw fields in positional order.
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.pm25,
            self.co2,
            self.so2,
            self.moss_humidity,
            self.pump_activity,
            self.solar_power,
        ]
    }

    /// Reject NaN and infinite values. Negative values are allowed here;
    /// they are clamped during feature derivation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (&(field, _), value) in RAW_FIELD_KEYS.iter().zip(self.to_array()) {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { field, value });
            }
        }
        Ok(())
    }

    /// Copy with every negative field floored at zero.
    pub fn clamped(&self) -> Self {
        Self {
            pm25: self.pm25.max(0.0),
            co2: self.co2.max(0.0),
            so2: self.so2.max(0.0),
            moss_humidity: self.moss_humidity.max(0.0),
            pump_activity: self.pump_activity.max(0.0),
            solar_power: self.solar_power.max(0.0),
        }
    }

    /// Parse a reading from a loosely-shaped JSON object.
    ///
    /// Accepts both snake_case names and the legacy dashboard field names
    /// (`PM25`, `Moss_Humidity`, ...). Every field must be present and numeric.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;
        let mut fields = [0.0_f64; 6];

        for (slot, &(name, keys)) in fields.iter_mut().zip(RAW_FIELD_KEYS.iter()) {
            let raw = keys
                .iter()
                .find_map(|k| obj.get(*k))
                .ok_or(ValidationError::MissingField(name))?;
            *slot = raw.as_f64().ok_or(ValidationError::NotNumeric(name))?;
        }

        let reading = Self::new(fields[0], fields[1], fields[2], fields[3], fields[4], fields[5]);
        reading.validate()?;
        Ok(reading)
    }
}

// ============================================================================
// Engineered Vector
// ============================================================================

/// Raw channels plus three derived features, all clamped non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineeredVector {
    pub pm25: f64,
    pub co2: f64,
    pub so2: f64,
    pub moss_humidity: f64,
    pub pump_activity: f64,
    pub solar_power: f64,
    /// PM2.5 change since the previous reading
    pub pm25_rate: f64,
    /// 100 - humidity
    pub moss_dryness: f64,
    /// pump / (solar + 1)
    pub activity_ratio: f64,
}

impl EngineeredVector {
    /// Features in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [
            self.pm25,
            self.co2,
            self.so2,
            self.moss_humidity,
            self.pump_activity,
            self.solar_power,
            self.pm25_rate,
            self.moss_dryness,
            self.activity_ratio,
        ]
    }

    pub fn from_array(v: [f64; NUM_FEATURES]) -> Self {
        Self {
            pm25: v[0],
            co2: v[1],
            so2: v[2],
            moss_humidity: v[3],
            pump_activity: v[4],
            solar_power: v[5],
            pm25_rate: v[6],
            moss_dryness: v[7],
            activity_ratio: v[8],
        }
    }
}

/// Z-scored feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedVector(pub [f64; NUM_FEATURES]);

/// A point in the 2-D principal-component plane where clustering happens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
}

impl ProjectedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_array(&self) -> [f64; NUM_COMPONENTS] {
        [self.x, self.y]
    }

    pub fn distance(&self, other: &[f64; NUM_COMPONENTS]) -> f64 {
        ((self.x - other[0]).powi(2) + (self.y - other[1]).powi(2)).sqrt()
    }
}

impl From<[f64; NUM_COMPONENTS]> for ProjectedPoint {
    fn from(v: [f64; NUM_COMPONENTS]) -> Self {
        Self { x: v[0], y: v[1] }
    }
}

// ============================================================================
// Pipeline Output
// ============================================================================

/// One fully processed sample, as buffered and emitted by the stream driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Position in the session (1-based)
    pub seq: u64,
    /// Arrival time
    pub timestamp: DateTime<Utc>,
    /// Engineered features that produced this point
    pub features: EngineeredVector,
    /// Projected coordinates
    pub point: ProjectedPoint,
    /// Assigned cluster index
    pub cluster: usize,
}

/// Read-only classification of a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub cluster: usize,
    /// Distance from the point to the assigned centroid
    pub distance: f64,
    /// `1 / (1 + distance)`, in (0, 1]
    pub confidence: f64,
    /// Number of clusters in the model (K)
    pub cluster_count: usize,
    pub point: ProjectedPoint,
}

/// Whether the particulate rate-of-change uses the truly previous streamed
/// reading or is pinned to zero for every streamed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateMode {
    /// Rate = current PM2.5 - previous PM2.5 (0 for the first sample)
    #[default]
    Previous,
    /// Rate is always 0 (each streamed sample treated as context-free)
    Zero,
}

impl std::fmt::Display for RateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateMode::Previous => write!(f, "previous"),
            RateMode::Zero => write!(f, "zero"),
        }
    }
}
