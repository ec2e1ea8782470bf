//! Streaming Pipeline Module
//!
//! ## Per-Sample Flow
//!
//! ```text
//! SampleSource ─► FeatureEngineer ─► Normalizer ─► Projector ─► ClusterModel
//!                  (prev reading)                                 (assign + update)
//!                                                                      │
//!                        SampleBuffer ◄── SessionState ◄───────────────┘
//!                        Aggregator   ◄──┘      └──► RecordSink
//! ```
//!
//! Samples are processed strictly one at a time. Only the cluster model, the
//! sample buffer and the aggregator carry state across samples.

mod aggregator;
mod buffer;
mod state;
pub mod processing_loop;
pub mod source;

pub use aggregator::Aggregator;
pub use buffer::SampleBuffer;
pub use processing_loop::{RecordSink, StreamDriver, StreamStats};
pub use source::{
    JsonLineSource, ReplaySource, SampleSource, SensorSimulator, SimulatedSource, SourceEvent,
    StdinSource,
};
pub use state::*;
