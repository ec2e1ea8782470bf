//! Feature engineering: raw sensor reading → 9-field engineered vector.
//!
//! The previous reading is an explicit argument. Callers that stream
//! samples carry it forward themselves (see `pipeline::processing_loop`).

use crate::types::{EngineeredVector, RawReading};

/// Dryness is measured against a fully saturated substrate (100 %).
const SATURATED_HUMIDITY: f64 = 100.0;

/// Stateless feature deriver.
pub struct FeatureEngineer;

impl FeatureEngineer {
    /// Derive the engineered vector for `current`.
    ///
    /// Raw fields are clamped to ≥ 0 first, derived fields are computed from
    /// the clamped values and clamped again. The rate field is 0 when there
    /// is no previous reading.
    pub fn derive(current: &RawReading, previous: Option<&RawReading>) -> EngineeredVector {
        let cur = current.clamped();

        let pm25_rate = previous
            .map(|prev| cur.pm25 - prev.clamped().pm25)
            .unwrap_or(0.0);
        let moss_dryness = SATURATED_HUMIDITY - cur.moss_humidity;
        // solar_power >= 0 after clamping, so the denominator is >= 1
        let activity_ratio = cur.pump_activity / (cur.solar_power + 1.0);

        EngineeredVector {
            pm25: cur.pm25,
            co2: cur.co2,
            so2: cur.so2,
            moss_humidity: cur.moss_humidity,
            pump_activity: cur.pump_activity,
            solar_power: cur.solar_power,
            pm25_rate: pm25_rate.max(0.0),
            moss_dryness: moss_dryness.max(0.0),
            activity_ratio: activity_ratio.max(0.0),
        }
    }

    /// Derive a whole batch, chaining each reading to its predecessor.
    pub fn derive_batch(readings: &[RawReading]) -> Vec<EngineeredVector> {
        let mut previous: Option<&RawReading> = None;
        readings
            .iter()
            .map(|r| {
                let v = Self::derive(r, previous);
                previous = Some(r);
                v
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_reading() -> RawReading {
        RawReading::new(50.0, 400.0, 15.0, 75.0, 1.5, 500.0)
    }

    #[test]
    fn test_reference_reading_without_previous() {
        let v = FeatureEngineer::derive(&reference_reading(), None);
        assert_eq!(v.pm25, 50.0);
        assert_eq!(v.co2, 400.0);
        assert_eq!(v.so2, 15.0);
        assert_eq!(v.moss_humidity, 75.0);
        assert_eq!(v.pump_activity, 1.5);
        assert_eq!(v.solar_power, 500.0);
        assert_eq!(v.pm25_rate, 0.0);
        assert_eq!(v.moss_dryness, 25.0);
        assert!((v.activity_ratio - 1.5 / 501.0).abs() < 1e-12);
        assert!((v.activity_ratio - 0.002994).abs() < 1e-6);
    }

    #[test]
    fn test_rate_uses_previous_reading() {
        let prev = RawReading::new(40.0, 400.0, 15.0, 75.0, 1.5, 500.0);
        let v = FeatureEngineer::derive(&reference_reading(), Some(&prev));
        assert_eq!(v.pm25_rate, 10.0);
    }

    #[test]
    fn test_falling_pm25_rate_clamps_to_zero() {
        let prev = RawReading::new(80.0, 400.0, 15.0, 75.0, 1.5, 500.0);
        let v = FeatureEngineer::derive(&reference_reading(), Some(&prev));
        assert_eq!(v.pm25_rate, 0.0);
    }

    #[test]
    fn test_negative_raw_inputs_clamped_before_derivation() {
        let r = RawReading::new(-10.0, -1.0, 15.0, 120.0, -0.5, -20.0);
        let v = FeatureEngineer::derive(&r, None);
        assert_eq!(v.pm25, 0.0);
        assert_eq!(v.co2, 0.0);
        assert_eq!(v.pump_activity, 0.0);
        assert_eq!(v.solar_power, 0.0);
        // humidity above saturation → dryness clamps at 0
        assert_eq!(v.moss_dryness, 0.0);
        // pump clamped to 0, denominator 1
        assert_eq!(v.activity_ratio, 0.0);
        for x in v.to_array() {
            assert!(x >= 0.0);
        }
    }

    #[test]
    fn test_previous_is_clamped_too() {
        // prev pm25 = -30 clamps to 0, so rate = 50 - 0
        let prev = RawReading::new(-30.0, 400.0, 15.0, 75.0, 1.5, 500.0);
        let v = FeatureEngineer::derive(&reference_reading(), Some(&prev));
        assert_eq!(v.pm25_rate, 50.0);
    }

    #[test]
    fn test_batch_first_rate_is_zero() {
        let batch = vec![
            RawReading::new(70.0, 400.0, 15.0, 75.0, 1.5, 500.0),
            RawReading::new(75.0, 400.0, 15.0, 75.0, 1.5, 500.0),
            RawReading::new(90.0, 400.0, 15.0, 75.0, 1.5, 500.0),
        ];
        let out = FeatureEngineer::derive_batch(&batch);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].pm25_rate, 0.0);
        assert_eq!(out[1].pm25_rate, 5.0);
        assert_eq!(out[2].pm25_rate, 15.0);
    }
}
