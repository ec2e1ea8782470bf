//! System-wide default constants.
//!
//! Grouped by subsystem. Config structs and the stand-alone types (buffer,
//! bootstrap params) both read from here so the two never drift.

// ============================================================================
// Bootstrap
// ============================================================================

/// Synthetic bootstrap batch size (readings).
pub const BOOTSTRAP_BATCH_SIZE: usize = 500;

/// Seed for the synthetic batch and k-means++ sampling.
pub const BOOTSTRAP_SEED: u64 = 42;

/// Smallest candidate cluster count.
pub const K_MIN: usize = 2;

/// Largest candidate cluster count.
pub const K_MAX: usize = 6;

/// Lloyd iteration cap per k-means run.
pub const KMEANS_MAX_ITERATIONS: usize = 300;

/// k-means++ restarts per candidate K.
pub const KMEANS_N_INIT: usize = 10;

/// Convergence threshold on squared centroid movement.
pub const KMEANS_TOLERANCE: f64 = 1e-8;

/// Starting observation count for each bootstrap centroid.
///
/// Non-zero so the first streamed samples cannot drag a centroid all the way
/// onto themselves.
pub const INITIAL_CENTROID_COUNT: u64 = 10;

// ============================================================================
// Streaming
// ============================================================================

/// Pause between streamed samples (seconds).
pub const STREAM_CADENCE_SECS: f64 = 0.3;

/// Samples per streaming session. 0 streams until cancelled.
pub const STREAM_SAMPLE_COUNT: u64 = 50;

/// Recent-sample ring buffer capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

// ============================================================================
// Persistence & Server
// ============================================================================

/// Model checkpoint path relative to the working directory.
pub const MODEL_PATH: &str = "biofilter_model.json";

/// HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8000";

/// Maximum accepted request body (bytes).
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;
