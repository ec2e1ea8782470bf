//! API route handlers
//!
//! - Service health and model metadata
//! - Read-only single-sample classification
//! - Streaming session control and polling (summary, buffer, counts)
//!
//! All handlers return `Response` via [`ApiResponse`] or [`ApiErrorResponse`].

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::StreamConfig;
use crate::ml_engine::bootstrap::CandidateScore;
use crate::ml_engine::SharedModel;
use crate::pipeline::{SensorSimulator, SharedSession, SimulatedSource, StreamDriver};
use crate::types::{ProjectedPoint, RawReading, SampleRecord, FEATURE_NAMES, NUM_COMPONENTS};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Loaded cluster model; `None` until a checkpoint exists
    pub model: Option<SharedModel>,
    /// Streaming session (buffer, tallies, status)
    pub session: SharedSession,
    /// Cancellation handle of the running stream
    pub stream_token: Arc<Mutex<Option<CancellationToken>>>,
    /// Process-wide shutdown; every stream token is its child
    pub shutdown: CancellationToken,
    /// Defaults for stream requests that leave fields out
    pub stream_defaults: StreamConfig,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(model: Option<SharedModel>, session: SharedSession, shutdown: CancellationToken) -> Self {
        Self {
            model,
            session,
            stream_token: Arc::new(Mutex::new(None)),
            shutdown,
            stream_defaults: StreamConfig::default(),
            started_at: Instant::now(),
        }
    }

    pub fn with_stream_defaults(mut self, defaults: StreamConfig) -> Self {
        self.stream_defaults = defaults;
        self
    }

    /// Cancellation handle for a new stream, registered as the one
    /// `POST /session/stop` cancels.
    pub async fn attach_stream(&self) -> CancellationToken {
        let token = self.shutdown.child_token();
        *self.stream_token.lock().await = Some(token.clone());
        token
    }
}

fn model_unavailable() -> Response {
    ApiErrorResponse::service_unavailable("Model unavailable: run `biofilter-engine bootstrap` first")
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub session_status: String,
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn get_health(State(state): State<ApiState>) -> Response {
    let session_status = state.session.read().await.status.to_string();
    ApiResponse::ok(HealthResponse {
        status: "healthy",
        model_loaded: state.model.is_some(),
        session_status,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ClusteringResponse {
    pub cluster: usize,
    /// `1 / (1 + distance)`
    pub confidence: f64,
    pub cluster_count: usize,
    pub distance: f64,
    /// Distance to every centroid, by cluster index
    pub distances: Vec<f64>,
    pub point: ProjectedPoint,
}

/// POST /api/v1/clustering
///
/// Classifies one reading without touching the model.
pub async fn classify(State(state): State<ApiState>, Json(body): Json<serde_json::Value>) -> Response {
    let reading = match RawReading::from_json(&body) {
        Ok(r) => r,
        Err(e) => return ApiErrorResponse::bad_request(e.to_string()),
    };
    let Some(model) = state.model.as_ref() else {
        return model_unavailable();
    };

    let model = model.read().await;
    let c = match model.classify_reading(&reading) {
        Ok(c) => c,
        Err(e) => return ApiErrorResponse::bad_request(e.to_string()),
    };
    ApiResponse::ok(ClusteringResponse {
        cluster: c.cluster,
        confidence: c.confidence,
        cluster_count: c.cluster_count,
        distance: c.distance,
        distances: model.distances(&c.point),
        point: c.point,
    })
}

// ============================================================================
// Model Info
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub cluster_count: usize,
    pub centroids: Vec<[f64; NUM_COMPONENTS]>,
    pub counts: Vec<u64>,
    pub silhouette: Option<f64>,
    pub candidate_scores: Vec<CandidateScore>,
    pub explained_variance: [f64; NUM_COMPONENTS],
    pub explained_variance_ratio: [f64; NUM_COMPONENTS],
    pub feature_names: Vec<&'static str>,
    pub batch_size: usize,
    pub seed: u64,
    pub fitted_at: DateTime<Utc>,
}

/// GET /api/v1/models/info
pub async fn get_model_info(State(state): State<ApiState>) -> Response {
    let Some(model) = state.model.as_ref() else {
        return model_unavailable();
    };

    let model = model.read().await;
    let s = model.state();
    ApiResponse::ok(ModelInfoResponse {
        cluster_count: s.k(),
        centroids: s.centroids.clone(),
        counts: s.counts.clone(),
        silhouette: s.silhouette,
        candidate_scores: s.candidate_scores.clone(),
        explained_variance: *s.projector.explained_variance(),
        explained_variance_ratio: *s.projector.explained_variance_ratio(),
        feature_names: FEATURE_NAMES.to_vec(),
        batch_size: s.batch_size,
        seed: s.seed,
        fitted_at: s.fitted_at,
    })
}

// ============================================================================
// Session Polling
// ============================================================================

/// GET /api/v1/session
pub async fn get_session(State(state): State<ApiState>) -> Response {
    let summary = state.session.read().await.summary();
    ApiResponse::ok(summary)
}

/// GET /api/v1/session/samples
pub async fn get_samples(State(state): State<ApiState>) -> Response {
    let samples: Vec<SampleRecord> = state.session.read().await.buffer.snapshot();
    ApiResponse::ok(samples)
}

#[derive(Debug, Serialize)]
pub struct CountsResponse {
    pub counts: BTreeMap<usize, u64>,
    pub total: u64,
}

/// GET /api/v1/session/counts
pub async fn get_counts(State(state): State<ApiState>) -> Response {
    let session = state.session.read().await;
    ApiResponse::ok(CountsResponse {
        counts: session.aggregator.counts().clone(),
        total: session.aggregator.total(),
    })
}

// ============================================================================
// Session Control
// ============================================================================

/// Body of POST /api/v1/session/stream. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct StreamRequest {
    pub sample_count: Option<u64>,
    /// Stream until stopped; overrides `sample_count`
    #[serde(default)]
    pub continuous: bool,
    pub cadence_seconds: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StreamStarted {
    pub sample_count: Option<u64>,
    pub cadence_seconds: f64,
    pub seed: Option<u64>,
}

/// POST /api/v1/session/stream
///
/// Starts a simulated stream in the background. 409 if one is running.
pub async fn start_stream(
    State(state): State<ApiState>,
    body: Option<Json<StreamRequest>>,
) -> Response {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let defaults = &state.stream_defaults;

    let cadence_seconds = req.cadence_seconds.unwrap_or(defaults.cadence_secs);
    let Ok(cadence) = Duration::try_from_secs_f64(cadence_seconds) else {
        return ApiErrorResponse::bad_request(format!(
            "cadence_seconds = {} must be finite and >= 0",
            cadence_seconds
        ));
    };
    let sample_count = if req.continuous {
        None
    } else {
        req.sample_count.or(defaults.sample_limit())
    };
    let seed = req.seed.or(defaults.seed);

    let Some(model) = state.model.clone() else {
        return model_unavailable();
    };

    // Claim the session and register the token under one lock, so neither a
    // second start nor a stop can land between the two
    let token = {
        let mut session = state.session.write().await;
        if session.is_streaming() {
            return ApiErrorResponse::conflict("A streaming session is already running");
        }
        session.mark_started();
        state.attach_stream().await
    };

    let simulator = match seed {
        Some(s) => SensorSimulator::new(s),
        None => SensorSimulator::from_entropy(),
    };
    let driver = StreamDriver::new(model, state.session.clone(), (), token)
        .with_cadence(cadence)
        .with_rate_mode(defaults.rate_mode);

    info!(
        sample_count = ?sample_count,
        cadence_seconds,
        seed = ?seed,
        "[HttpServer] Starting simulated stream"
    );
    tokio::spawn(async move {
        let mut source = SimulatedSource::new(simulator, sample_count);
        driver.run(&mut source).await;
    });

    ApiResponse::accepted(StreamStarted {
        sample_count,
        cadence_seconds,
        seed,
    })
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub was_running: bool,
}

/// POST /api/v1/session/stop
pub async fn stop_stream(State(state): State<ApiState>) -> Response {
    let token = state.stream_token.lock().await.take();
    let was_running = state.session.read().await.is_streaming();
    if let Some(token) = token {
        token.cancel();
    }
    if was_running {
        info!("[HttpServer] Stream stop requested");
    }
    ApiResponse::ok(StopResponse { was_running })
}

/// POST /api/v1/session/reset
///
/// Explicit session restart: clears the buffer and the tallies. The model
/// keeps everything it has learned.
pub async fn reset_session(State(state): State<ApiState>) -> Response {
    let mut session = state.session.write().await;
    if session.is_streaming() {
        return ApiErrorResponse::conflict("Stop the running stream before resetting the session");
    }
    session.reset();
    info!("[HttpServer] Session reset");
    ApiResponse::ok(session.summary())
}
