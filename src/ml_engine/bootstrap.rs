//! One-time bootstrap fit.
//!
//! Batch of raw readings → engineered vectors → normalizer → PCA projector →
//! k-means for every candidate K → pick K by silhouette → final centroids.
//! Candidate K values are scored in parallel; the result is identical to a
//! sequential run because every candidate uses the same seed.

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::defaults;
use crate::ml_engine::clusterer::{ModelState, MODEL_STATE_VERSION};
use crate::ml_engine::features::FeatureEngineer;
use crate::ml_engine::kmeans::{self, KMeansConfig, Point};
use crate::ml_engine::normalizer::Normalizer;
use crate::ml_engine::pca;
use crate::ml_engine::ModelError;
use crate::types::{NormalizedVector, RawReading};

/// Bootstrap knobs. Defaults reproduce the reference model fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapParams {
    pub k_min: usize,
    pub k_max: usize,
    pub seed: u64,
    pub max_iterations: usize,
    pub n_init: usize,
    pub tolerance: f64,
    /// Starting observation count for every centroid
    pub initial_count: u64,
}

impl Default for BootstrapParams {
    fn default() -> Self {
        Self {
            k_min: defaults::K_MIN,
            k_max: defaults::K_MAX,
            seed: defaults::BOOTSTRAP_SEED,
            max_iterations: defaults::KMEANS_MAX_ITERATIONS,
            n_init: defaults::KMEANS_N_INIT,
            tolerance: defaults::KMEANS_TOLERANCE,
            initial_count: defaults::INITIAL_CENTROID_COUNT,
        }
    }
}

impl BootstrapParams {
    fn kmeans_config(&self) -> KMeansConfig {
        KMeansConfig {
            max_iterations: self.max_iterations,
            n_init: self.n_init,
            tolerance: self.tolerance,
            seed: self.seed,
        }
    }
}

/// Silhouette of one candidate K. `None` when fewer than two clusters ended
/// up populated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub k: usize,
    pub silhouette: Option<f64>,
}

/// Fit a complete model state from a representative batch.
pub fn fit(readings: &[RawReading], params: &BootstrapParams) -> Result<ModelState, ModelError> {
    if params.k_min == 0 || params.k_max < params.k_min {
        return Err(ModelError::InvalidState(format!(
            "invalid K range {}..={}",
            params.k_min, params.k_max
        )));
    }
    if readings.len() < params.k_min {
        return Err(ModelError::InsufficientData {
            needed: params.k_min,
            available: readings.len(),
        });
    }

    info!(
        samples = readings.len(),
        k_min = params.k_min,
        k_max = params.k_max,
        seed = params.seed,
        "Bootstrap fit starting"
    );

    let engineered = FeatureEngineer::derive_batch(readings);
    let normalizer = Normalizer::fit(&engineered).ok_or(ModelError::InsufficientData {
        needed: 1,
        available: 0,
    })?;
    let normalized: Vec<NormalizedVector> = engineered.iter().map(|v| normalizer.normalize(v)).collect();

    let projector = pca::fit(&normalized);
    debug!(
        ratio = ?projector.explained_variance_ratio(),
        "PCA projection fitted"
    );

    let points: Vec<Point> = normalized
        .iter()
        .map(|v| projector.project(v).to_array())
        .collect();

    let config = params.kmeans_config();
    let candidate_scores: Vec<CandidateScore> = (params.k_min..=params.k_max)
        .into_par_iter()
        .filter(|&k| k <= points.len())
        .map(|k| {
            let silhouette = kmeans::fit(&points, k, &config)
                .and_then(|r| kmeans::silhouette(&points, &r.labels, k));
            CandidateScore { k, silhouette }
        })
        .collect();

    for c in &candidate_scores {
        debug!(k = c.k, silhouette = ?c.silhouette, "Candidate scored");
    }

    let chosen = select_k(&candidate_scores).ok_or(ModelError::InsufficientData {
        needed: params.k_min,
        available: points.len(),
    })?;

    let final_fit = kmeans::fit(&points, chosen.k, &config).ok_or(ModelError::InsufficientData {
        needed: chosen.k,
        available: points.len(),
    })?;

    info!(
        k = chosen.k,
        silhouette = ?chosen.silhouette,
        inertia = final_fit.inertia,
        "Bootstrap fit complete"
    );

    let state = ModelState {
        version: MODEL_STATE_VERSION,
        normalizer,
        projector,
        counts: vec![params.initial_count; final_fit.centroids.len()],
        centroids: final_fit.centroids,
        candidate_scores,
        silhouette: chosen.silhouette,
        batch_size: readings.len(),
        seed: params.seed,
        fitted_at: Utc::now(),
    };
    state.validate()?;
    Ok(state)
}

/// Highest silhouette wins; ties and undefined scores fall to the smallest K.
fn select_k(candidates: &[CandidateScore]) -> Option<CandidateScore> {
    let mut best: Option<CandidateScore> = None;
    for &c in candidates {
        best = match best {
            None => Some(c),
            Some(b) => {
                let better = match (c.silhouette, b.silhouette) {
                    (Some(s), Some(bs)) => s > bs,
                    (Some(_), None) => true,
                    _ => false,
                };
                if better || (c.silhouette == b.silhouette && c.k < b.k) {
                    Some(c)
                } else {
                    Some(b)
                }
            }
        };
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml_engine::ClusterModel;
    use crate::types::FEATURE_NAMES;

    /// Two well-separated operating regimes, alternating so the rate field
    /// stays informative.
    fn two_regime_batch() -> Vec<RawReading> {
        (0..60)
            .map(|i| {
                let jitter = (i % 5) as f64 * 0.4;
                if i % 2 == 0 {
                    RawReading::new(20.0 + jitter, 380.0, 8.0, 85.0, 1.0, 700.0)
                } else {
                    RawReading::new(120.0 + jitter, 520.0, 30.0, 40.0, 2.5, 150.0)
                }
            })
            .collect()
    }

    #[test]
    fn test_constant_batch_yields_full_confidence() {
        let reading = RawReading::new(50.0, 400.0, 15.0, 75.0, 1.5, 500.0);
        let batch = vec![reading; 30];
        let state = fit(&batch, &BootstrapParams::default()).unwrap();

        // Undefined silhouettes everywhere → smallest K
        assert_eq!(state.k(), 2);
        assert!(state.silhouette.is_none());

        let model = ClusterModel::new(state).unwrap();
        let c = model.classify_reading(&reading).unwrap();
        assert_eq!(c.cluster, 0);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_two_regimes_select_k_in_range() {
        let state = fit(&two_regime_batch(), &BootstrapParams::default()).unwrap();
        assert!((2..=6).contains(&state.k()));
        assert_eq!(state.candidate_scores.len(), 5);
        assert_eq!(state.batch_size, 60);
        let best = state.silhouette.unwrap();
        for c in &state.candidate_scores {
            if let Some(s) = c.silhouette {
                assert!(s <= best + 1e-12);
            }
        }
    }

    #[test]
    fn test_counts_start_at_initial_count() {
        let params = BootstrapParams {
            initial_count: 7,
            ..Default::default()
        };
        let state = fit(&two_regime_batch(), &params).unwrap();
        assert!(state.counts.iter().all(|&c| c == 7));
        assert_eq!(state.counts.len(), state.centroids.len());
    }

    #[test]
    fn test_fit_is_deterministic() {
        let a = fit(&two_regime_batch(), &BootstrapParams::default()).unwrap();
        let b = fit(&two_regime_batch(), &BootstrapParams::default()).unwrap();
        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.candidate_scores, b.candidate_scores);
        assert_eq!(a.normalizer, b.normalizer);
    }

    #[test]
    fn test_batch_smaller_than_k_min() {
        let batch = vec![RawReading::new(50.0, 400.0, 15.0, 75.0, 1.5, 500.0)];
        let err = fit(&batch, &BootstrapParams::default()).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { needed: 2, available: 1 }));
        assert!(fit(&[], &BootstrapParams::default()).is_err());
    }

    #[test]
    fn test_candidates_above_batch_size_skipped() {
        let batch: Vec<_> = two_regime_batch().into_iter().take(4).collect();
        let state = fit(&batch, &BootstrapParams::default()).unwrap();
        let ks: Vec<usize> = state.candidate_scores.iter().map(|c| c.k).collect();
        assert_eq!(ks, vec![2, 3, 4]);
    }

    #[test]
    fn test_select_k_tie_goes_to_smallest() {
        let c = [
            CandidateScore { k: 2, silhouette: Some(0.5) },
            CandidateScore { k: 3, silhouette: Some(0.7) },
            CandidateScore { k: 4, silhouette: Some(0.7) },
            CandidateScore { k: 5, silhouette: None },
        ];
        assert_eq!(select_k(&c).unwrap().k, 3);

        let undefined = [
            CandidateScore { k: 2, silhouette: None },
            CandidateScore { k: 3, silhouette: None },
        ];
        assert_eq!(select_k(&undefined).unwrap().k, 2);
    }

    #[test]
    fn test_feature_order_shared_with_normalizer() {
        let state = fit(&two_regime_batch(), &BootstrapParams::default()).unwrap();
        assert_eq!(state.normalizer.mean().len(), FEATURE_NAMES.len());
    }
}
