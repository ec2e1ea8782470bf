//! Online k-means over the projected plane.
//!
//! The model starts from bootstrap centroids whose counts are already
//! non-zero, then moves each winning centroid by an incremental mean:
//! `c ← c + (p − c) / (n + 1)`, `n ← n + 1`. There is no decay, so a
//! centroid's step size shrinks as its lifetime count grows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ml_engine::bootstrap::CandidateScore;
use crate::ml_engine::features::FeatureEngineer;
use crate::ml_engine::kmeans::{nearest, Point};
use crate::ml_engine::normalizer::Normalizer;
use crate::ml_engine::projector::Projector;
use crate::ml_engine::ModelError;
use crate::types::{Classification, EngineeredVector, ProjectedPoint, RawReading, ValidationError};

/// Current checkpoint format version.
pub const MODEL_STATE_VERSION: u32 = 1;

/// Everything a running model needs, plus bootstrap provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub version: u32,
    pub normalizer: Normalizer,
    pub projector: Projector,
    /// Centroid `i` in the projected plane
    pub centroids: Vec<Point>,
    /// Lifetime observation count of centroid `i`
    pub counts: Vec<u64>,
    /// Silhouette per candidate K evaluated at bootstrap
    #[serde(default)]
    pub candidate_scores: Vec<CandidateScore>,
    /// Silhouette of the chosen K (absent when undefined)
    #[serde(default)]
    pub silhouette: Option<f64>,
    /// Number of readings in the bootstrap batch
    #[serde(default)]
    pub batch_size: usize,
    #[serde(default)]
    pub seed: u64,
    pub fitted_at: DateTime<Utc>,
}

impl ModelState {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    /// Structural checks. Every violation is collected so one error names
    /// all of them.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut problems = Vec::new();

        if self.centroids.is_empty() {
            problems.push("model has zero clusters".to_string());
        }
        if self.centroids.len() != self.counts.len() {
            problems.push(format!(
                "{} centroids but {} counts",
                self.centroids.len(),
                self.counts.len()
            ));
        }
        if !self.centroids.iter().flatten().all(|v| v.is_finite()) {
            problems.push("non-finite centroid coordinate".to_string());
        }
        if !self.normalizer.is_valid() {
            problems.push("non-finite or negative normalizer coefficient".to_string());
        }
        if !self.projector.is_valid() {
            problems.push("non-finite projection coefficient".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ModelError::InvalidState(problems.join("; ")))
        }
    }
}

/// The live clustering model.
///
/// Normalizer and projector are frozen; only centroids and counts move.
#[derive(Debug, Clone)]
pub struct ClusterModel {
    state: ModelState,
}

impl ClusterModel {
    /// Wrap a state after validating it. K = 0 is rejected here.
    pub fn new(state: ModelState) -> Result<Self, ModelError> {
        state.validate()?;
        Ok(Self { state })
    }

    pub fn k(&self) -> usize {
        self.state.k()
    }

    pub fn centroids(&self) -> &[Point] {
        &self.state.centroids
    }

    pub fn counts(&self) -> &[u64] {
        &self.state.counts
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.state.normalizer
    }

    pub fn projector(&self) -> &Projector {
        &self.state.projector
    }

    /// Read-only view of the full state.
    pub fn state(&self) -> &ModelState {
        &self.state
    }

    /// Owned copy of the state, e.g. for checkpointing.
    pub fn snapshot(&self) -> ModelState {
        self.state.clone()
    }

    /// Engineered vector → projected point through the frozen maps.
    pub fn embed(&self, v: &EngineeredVector) -> ProjectedPoint {
        let normalized = self.state.normalizer.normalize(v);
        self.state.projector.project(&normalized)
    }

    /// [`embed`](Self::embed), refusing points the model cannot place.
    ///
    /// Extreme but finite readings can overflow in the normalizer or in the
    /// distance sum; such a point would win centroid 0 by default and drag it
    /// to infinity.
    pub fn embed_checked(&self, v: &EngineeredVector) -> Result<ProjectedPoint, ValidationError> {
        let point = self.embed(v);
        let placeable = point.x.is_finite()
            && point.y.is_finite()
            && self.distances(&point).iter().all(|d| d.is_finite());
        if placeable {
            Ok(point)
        } else {
            Err(ValidationError::OutOfRange {
                x: point.x,
                y: point.y,
            })
        }
    }

    /// Nearest centroid, lowest index on ties.
    pub fn assign(&self, p: &ProjectedPoint) -> usize {
        nearest(&p.to_array(), &self.state.centroids).0
    }

    /// Euclidean distance from `p` to every centroid.
    pub fn distances(&self, p: &ProjectedPoint) -> Vec<f64> {
        self.state.centroids.iter().map(|c| p.distance(c)).collect()
    }

    /// Move centroid `index` toward `p` by the incremental mean.
    pub fn update(&mut self, p: &ProjectedPoint, index: usize) -> Result<(), ModelError> {
        let k = self.k();
        if index >= k {
            return Err(ModelError::UnknownCluster { index, k });
        }

        let count = self.state.counts[index];
        let step = 1.0 / (count as f64 + 1.0);
        let centroid = &mut self.state.centroids[index];
        for (c, x) in centroid.iter_mut().zip(p.to_array()) {
            *c += (x - *c) * step;
        }
        self.state.counts[index] = count.saturating_add(1);
        Ok(())
    }

    /// Assign `p`, then fold it into the winning centroid.
    pub fn assign_and_update(&mut self, p: &ProjectedPoint) -> usize {
        let index = self.assign(p);
        // assign() always returns an index below K
        if let Err(e) = self.update(p, index) {
            tracing::error!("[ClusterModel] update after assign failed: {}", e);
        }
        index
    }

    /// Read-only classification of an engineered vector.
    pub fn classify(&self, v: &EngineeredVector) -> Result<Classification, ValidationError> {
        let point = self.embed_checked(v)?;
        let cluster = self.assign(&point);
        let distance = point.distance(&self.state.centroids[cluster]);
        Ok(Classification {
            cluster,
            distance,
            confidence: confidence(distance),
            cluster_count: self.k(),
            point,
        })
    }

    /// Classify a single raw reading with no previous-reading context.
    pub fn classify_reading(&self, reading: &RawReading) -> Result<Classification, ValidationError> {
        self.classify(&FeatureEngineer::derive(reading, None))
    }
}

/// `1 / (1 + d)`: 1.0 on a centroid, approaching 0 far away.
pub fn confidence(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}
