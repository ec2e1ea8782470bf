//! ML Engine for biofilter behaviour clustering
//!
//! Turns sensor readings into cluster assignments with a model that is
//! fitted once and then keeps adapting online.
//!
//! ## Key Features
//! - Feature engineering with explicit previous-reading chaining
//! - Fixed z-score normalization and 2-component PCA projection ("trained once, applied forever")
//! - Online k-means with incremental-mean centroid updates (no decay)
//! - One-time bootstrap: K chosen from 2..=6 by silhouette score
//! - Atomic JSON checkpoints with format-version check
//!
//! ## Architecture
//! - `features`: RawReading → EngineeredVector
//! - `normalizer`: per-feature affine z-score map
//! - `projector`: fixed 9×2 linear map
//! - `pca`: covariance eigen-decomposition used at bootstrap
//! - `kmeans`: seeded batch k-means and silhouette scoring
//! - `clusterer`: the online ClusterModel
//! - `bootstrap`: offline fit producing a ModelState
//! - `checkpoint`: disk persistence

pub mod features;
pub mod normalizer;
pub mod projector;
pub mod pca;
pub mod kmeans;
pub mod clusterer;
pub mod bootstrap;
pub mod checkpoint;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

// Re-export public types
pub use features::FeatureEngineer;
pub use normalizer::Normalizer;
pub use projector::Projector;
pub use clusterer::{ClusterModel, ModelState, MODEL_STATE_VERSION};
pub use bootstrap::{fit as bootstrap_fit, BootstrapParams, CandidateScore};
pub use checkpoint::{load_from_disk, save_to_disk};

/// Cluster model shared between the stream driver and read-only query paths.
///
/// Writers (`assign_and_update`) take the write lock for the whole update;
/// classification takes the read lock, so no reader ever sees a half-moved
/// centroid.
pub type SharedModel = Arc<RwLock<ClusterModel>>;

/// Wrap a model for shared access.
pub fn shared(model: ClusterModel) -> SharedModel {
    Arc::new(RwLock::new(model))
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid model state: {0}")]
    InvalidState(String),

    #[error("Insufficient data: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Unknown cluster index {index} (model has {k} clusters)")]
    UnknownCluster { index: usize, k: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Schema version mismatch: file has v{0}, expected v{1}")]
    SchemaMismatch(u32, u32),
}
