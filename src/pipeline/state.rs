//! Streaming session state
//!
//! Shared between the stream driver (single writer) and the HTTP polling
//! path (readers). Wrapped in `Arc<RwLock<>>`; the driver holds the write
//! lock only for the per-sample bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::aggregator::Aggregator;
use super::buffer::SampleBuffer;
use crate::types::SampleRecord;

/// Session state handle shared across tasks.
pub type SharedSession = Arc<RwLock<SessionState>>;

// ============================================================================
// Session State
// ============================================================================

/// Everything a streaming session accumulates between resets.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub status: SessionStatus,
    pub buffer: SampleBuffer,
    pub aggregator: Aggregator,
    /// Samples that made it through the pipeline
    pub processed: u64,
    /// Readings dropped at validation
    pub rejected: u64,
    pub latest: Option<SampleRecord>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            status: SessionStatus::Idle,
            buffer: SampleBuffer::new(buffer_capacity),
            aggregator: Aggregator::new(),
            processed: 0,
            rejected: 0,
            latest: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Wrap for sharing.
    pub fn shared(buffer_capacity: usize) -> SharedSession {
        Arc::new(RwLock::new(Self::new(buffer_capacity)))
    }

    /// Fold one processed record into the buffer and tally.
    pub fn record(&mut self, record: SampleRecord) {
        self.aggregator.record(record.cluster);
        self.processed += 1;
        self.latest = Some(record.clone());
        self.buffer.push(record);
    }

    pub fn mark_started(&mut self) {
        self.status = SessionStatus::Streaming;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
    }

    pub fn mark_finished(&mut self, status: SessionStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Explicit session restart: empty buffer, zero tallies.
    pub fn reset(&mut self) {
        *self = Self::new(self.buffer.capacity());
    }

    pub fn is_streaming(&self) -> bool {
        self.status == SessionStatus::Streaming
    }

    /// Serializable summary for the polling path.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            status: self.status,
            processed: self.processed,
            rejected: self.rejected,
            counts: self.aggregator.counts().clone(),
            buffered: self.buffer.len(),
            buffer_capacity: self.buffer.capacity(),
            latest: self.latest.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(crate::config::defaults::DEFAULT_BUFFER_CAPACITY)
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub status: SessionStatus,
    pub processed: u64,
    pub rejected: u64,
    pub counts: BTreeMap<usize, u64>,
    pub buffered: usize,
    pub buffer_capacity: usize,
    pub latest: Option<SampleRecord>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No stream has run since start or reset
    Idle,
    /// A stream is running
    Streaming,
    /// The source ran dry
    Completed,
    /// Stopped by cancellation
    Cancelled,
    /// The source broke before reaching its end
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "Idle"),
            SessionStatus::Streaming => write!(f, "Streaming"),
            SessionStatus::Completed => write!(f, "Completed"),
            SessionStatus::Cancelled => write!(f, "Cancelled"),
            SessionStatus::Failed => write!(f, "Failed"),
        }
    }
}
