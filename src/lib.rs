//! Biofilter Engine: streaming behaviour clustering for biofilter sensor data
//!
//! Turns periodic sensor readings into cluster assignments with a model that
//! is fitted once from a synthetic batch and keeps adapting online.
//!
//! ## Architecture
//!
//! - **ML Engine**: feature engineering, fixed normalization and projection,
//!   online k-means, bootstrap fit and checkpoints
//! - **Pipeline**: sample sources, the stream driver, session buffer and tallies
//! - **API**: HTTP classification, model metadata and session control
//! - **Config**: TOML configuration with validation

pub mod api;
pub mod config;
pub mod ml_engine;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::EngineConfig;

// Re-export commonly used types
pub use types::{
    Classification, EngineeredVector, NormalizedVector, ProjectedPoint, RateMode, RawReading,
    SampleRecord, ValidationError,
};

// Re-export ML Engine types
pub use ml_engine::{
    bootstrap_fit, BootstrapParams, ClusterModel, FeatureEngineer, ModelError, ModelState,
    Normalizer, Projector, SharedModel,
};

// Re-export pipeline components
pub use pipeline::{
    Aggregator, SampleBuffer, SampleSource, SessionState, SharedSession, StreamDriver, StreamStats,
};
