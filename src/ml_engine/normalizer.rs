//! Fixed z-score normalization of the 9 engineered features.
//!
//! Mean and standard deviation are learned once at bootstrap and never
//! touched by streaming traffic. A feature whose learned deviation is zero
//! normalizes to 0 regardless of input.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::types::{EngineeredVector, NormalizedVector, NUM_FEATURES};

/// Deviations at or below this (relative to the feature's magnitude) are
/// treated as exactly zero. Absorbs rounding noise on constant features.
const ZERO_STD_RELATIVE: f64 = 1e-12;

/// Per-feature affine transform `(x - mean) / std`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    mean: [f64; NUM_FEATURES],
    std: [f64; NUM_FEATURES],
}

impl Normalizer {
    pub fn new(mean: [f64; NUM_FEATURES], std: [f64; NUM_FEATURES]) -> Self {
        Self { mean, std }
    }

    /// Learn population mean and standard deviation per feature.
    ///
    /// Returns `None` for an empty batch.
    pub fn fit(vectors: &[EngineeredVector]) -> Option<Self> {
        if vectors.is_empty() {
            return None;
        }

        let rows: Vec<[f64; NUM_FEATURES]> = vectors.iter().map(EngineeredVector::to_array).collect();
        let mut mean = [0.0; NUM_FEATURES];
        let mut std = [0.0; NUM_FEATURES];

        for i in 0..NUM_FEATURES {
            let column: Vec<f64> = rows.iter().map(|r| r[i]).collect();
            mean[i] = column.iter().mean();
            let sd = column.iter().population_std_dev();
            std[i] = if sd.is_finite() && sd > ZERO_STD_RELATIVE * mean[i].abs().max(1.0) {
                sd
            } else {
                0.0
            };
        }

        Some(Self { mean, std })
    }

    pub fn mean(&self) -> &[f64; NUM_FEATURES] {
        &self.mean
    }

    pub fn std(&self) -> &[f64; NUM_FEATURES] {
        &self.std
    }

    /// Apply the z-score transform.
    pub fn normalize(&self, v: &EngineeredVector) -> NormalizedVector {
        let raw = v.to_array();
        let mut out = [0.0; NUM_FEATURES];
        for i in 0..NUM_FEATURES {
            if self.std[i] > 0.0 {
                out[i] = (raw[i] - self.mean[i]) / self.std[i];
            }
        }
        NormalizedVector(out)
    }

    /// Inverse transform. Zero-deviation features map back to their mean.
    pub fn denormalize(&self, v: &NormalizedVector) -> EngineeredVector {
        let mut out = [0.0; NUM_FEATURES];
        for i in 0..NUM_FEATURES {
            out[i] = v.0[i] * self.std[i] + self.mean[i];
        }
        EngineeredVector::from_array(out)
    }

    /// Whether every coefficient is finite and every deviation non-negative.
    pub fn is_valid(&self) -> bool {
        self.mean.iter().all(|m| m.is_finite())
            && self.std.iter().all(|s| s.is_finite() && *s >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(i: f64) -> EngineeredVector {
        EngineeredVector::from_array([
            50.0 + i,
            400.0 - 2.0 * i,
            15.0,
            75.0 + 0.5 * i,
            1.5,
            500.0 + 10.0 * i,
            i,
            25.0 - 0.5 * i,
            0.003,
        ])
    }

    #[test]
    fn test_fit_mean_and_population_std() {
        let batch: Vec<_> = (0..5).map(|i| vector(i as f64)).collect();
        let norm = Normalizer::fit(&batch).unwrap();
        // pm25 = 50..54, mean 52, population variance 2
        assert!((norm.mean()[0] - 52.0).abs() < 1e-12);
        assert!((norm.std()[0] - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip_recovers_input() {
        let batch: Vec<_> = (0..20).map(|i| vector(i as f64)).collect();
        let norm = Normalizer::fit(&batch).unwrap();

        let sample = vector(7.3);
        let back = norm.denormalize(&norm.normalize(&sample)).to_array();
        let orig = sample.to_array();
        for i in 0..NUM_FEATURES {
            if norm.std()[i] > 0.0 {
                assert!((back[i] - orig[i]).abs() < 1e-9, "feature {} drifted", i);
            }
        }
    }

    #[test]
    fn test_zero_std_feature_normalizes_to_zero() {
        let batch: Vec<_> = (0..10).map(|i| vector(i as f64)).collect();
        let norm = Normalizer::fit(&batch).unwrap();

        // so2, pump and ratio are constant in the batch
        assert_eq!(norm.std()[2], 0.0);
        assert_eq!(norm.std()[4], 0.0);
        assert_eq!(norm.std()[8], 0.0);

        let mut wild = vector(3.0);
        wild.so2 = 9_999.0;
        let n = norm.normalize(&wild);
        assert_eq!(n.0[2], 0.0);
        assert!(n.0.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_constant_batch_is_all_zero() {
        let v = vector(0.0);
        let batch = vec![v; 25];
        let norm = Normalizer::fit(&batch).unwrap();
        assert!(norm.std().iter().all(|s| *s == 0.0));
        assert_eq!(norm.normalize(&v).0, [0.0; NUM_FEATURES]);
    }

    #[test]
    fn test_empty_batch() {
        assert!(Normalizer::fit(&[]).is_none());
    }
}
