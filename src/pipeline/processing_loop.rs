//! The stream driver: one loop shared by every input mode.
//!
//! Per reading: derive features against the previous reading, embed and
//! assign under the model write lock, fold the record into the session,
//! hand it to the sink, then wait out the cadence. Cancellation is checked
//! while waiting for a reading and while sleeping, never mid-sample.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::source::{SampleSource, SourceEvent};
use super::state::{SessionStatus, SharedSession};
use crate::ml_engine::{FeatureEngineer, SharedModel};
use crate::types::{RateMode, RawReading, SampleRecord};

// ============================================================================
// Record Sink
// ============================================================================

/// Where processed records go after the session has absorbed them.
///
/// Pass `()` when only the shared session matters.
pub trait RecordSink: Send + 'static {
    /// Returns `false` once nobody is listening; the driver then stops.
    fn emit(&mut self, record: &SampleRecord) -> bool;
}

/// Discards records.
impl RecordSink for () {
    fn emit(&mut self, _record: &SampleRecord) -> bool {
        true
    }
}

/// Collects every record (tests, headless runs).
impl RecordSink for Vec<SampleRecord> {
    fn emit(&mut self, record: &SampleRecord) -> bool {
        self.push(record.clone());
        true
    }
}

/// Forwards records to a consumer task.
impl RecordSink for mpsc::UnboundedSender<SampleRecord> {
    fn emit(&mut self, record: &SampleRecord) -> bool {
        self.send(record.clone()).is_ok()
    }
}

// ============================================================================
// Stream Driver
// ============================================================================

/// Outcome of a streaming run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub processed: u64,
    pub rejected: u64,
    pub status: SessionStatus,
}

/// Owns everything needed for one streaming run.
///
/// Built with [`new()`](StreamDriver::new), tuned with the `with_*`
/// builders, then consumed by [`run()`](StreamDriver::run).
pub struct StreamDriver<K: RecordSink> {
    model: SharedModel,
    session: SharedSession,
    sink: K,
    cancel_token: CancellationToken,
    cadence: Duration,
    rate_mode: RateMode,
}

impl<K: RecordSink> StreamDriver<K> {
    pub fn new(
        model: SharedModel,
        session: SharedSession,
        sink: K,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            model,
            session,
            sink,
            cancel_token,
            cadence: Duration::ZERO,
            rate_mode: RateMode::default(),
        }
    }

    /// Pause between samples.
    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_rate_mode(mut self, rate_mode: RateMode) -> Self {
        self.rate_mode = rate_mode;
        self
    }

    /// Run until the source is exhausted or cancellation.
    ///
    /// Returns the final stats; the sink is handed back so collecting sinks
    /// can be inspected.
    pub async fn run<S: SampleSource>(mut self, source: &mut S) -> (StreamStats, K) {
        // Previous-reading state is per run
        let mut previous: Option<RawReading> = None;
        let mut processed = 0u64;
        let mut rejected = 0u64;
        let mut status = SessionStatus::Completed;

        self.session.write().await.mark_started();

        info!(
            "🌿 Streaming readings from {} (cadence {:?}, rate mode {})",
            source.source_name(),
            self.cadence,
            self.rate_mode
        );
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    info!("[StreamDriver] Shutdown signal received");
                    status = SessionStatus::Cancelled;
                    break;
                }
                result = source.next_reading() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            error!("[StreamDriver] Source error: {}", e);
                            status = SessionStatus::Failed;
                            break;
                        }
                    }
                }
            };

            let reading = match event {
                SourceEvent::Reading(r) => r,
                SourceEvent::Rejected(reason) => {
                    rejected += 1;
                    self.session.write().await.rejected += 1;
                    warn!("[StreamDriver] Rejected reading: {}", reason);
                    continue;
                }
                SourceEvent::Eof => {
                    info!(
                        "[StreamDriver] Source reached end ({} samples processed)",
                        processed
                    );
                    break;
                }
            };

            let prior = match self.rate_mode {
                RateMode::Previous => previous.as_ref(),
                RateMode::Zero => None,
            };
            let features = FeatureEngineer::derive(&reading, prior);

            let placed = {
                let mut model = self.model.write().await;
                model
                    .embed_checked(&features)
                    .map(|point| (point, model.assign_and_update(&point)))
            };
            let (point, cluster) = match placed {
                Ok(placed) => placed,
                Err(reason) => {
                    rejected += 1;
                    self.session.write().await.rejected += 1;
                    warn!("[StreamDriver] Rejected reading: {}", reason);
                    continue;
                }
            };

            processed += 1;
            let record = SampleRecord {
                seq: processed,
                timestamp: Utc::now(),
                features,
                point,
                cluster,
            };

            self.session.write().await.record(record.clone());
            previous = Some(reading);
            if !self.sink.emit(&record) {
                info!("[StreamDriver] Record consumer went away, stopping");
                status = SessionStatus::Cancelled;
                break;
            }

            debug!(
                seq = record.seq,
                cluster = record.cluster,
                x = record.point.x,
                y = record.point.y,
                "Sample processed"
            );
            if processed % 10 == 0 {
                info!("📈 Progress: {} samples | Rejected: {}", processed, rejected);
            }

            if !self.cadence.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel_token.cancelled() => {
                        info!("[StreamDriver] Shutdown signal received");
                        status = SessionStatus::Cancelled;
                        break;
                    }
                    _ = tokio::time::sleep(self.cadence) => {}
                }
            }
        }

        let counts = {
            let mut session = self.session.write().await;
            session.mark_finished(status);
            session.aggregator.counts().clone()
        };

        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📊 FINAL STATISTICS");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("   Samples Processed:    {}", processed);
        info!("   Readings Rejected:    {}", rejected);
        info!("   Session Status:       {}", status);
        for (cluster, count) in &counts {
            info!("   Cluster {}:            {}", cluster, count);
        }
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        (
            StreamStats {
                processed,
                rejected,
                status,
            },
            self.sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml_engine::{bootstrap_fit, shared, BootstrapParams, ClusterModel};
    use crate::pipeline::source::{ReplaySource, SensorSimulator, SimulatedSource};
    use crate::pipeline::state::SessionState;

    fn fitted_model() -> SharedModel {
        let batch = SensorSimulator::new(42).batch(120);
        let state = bootstrap_fit(&batch, &BootstrapParams::default()).unwrap();
        shared(ClusterModel::new(state).unwrap())
    }

    #[tokio::test]
    async fn test_finite_source_runs_to_completion() {
        let model = fitted_model();
        let session = SessionState::shared(100);
        let driver = StreamDriver::new(model.clone(), session.clone(), Vec::new(), CancellationToken::new());

        let mut source = SimulatedSource::new(SensorSimulator::new(7), Some(25));
        let (stats, records) = driver.run(&mut source).await;

        assert_eq!(stats.processed, 25);
        assert_eq!(stats.status, SessionStatus::Completed);
        assert_eq!(records.len(), 25);
        assert_eq!(records[0].features.pm25_rate, 0.0);
        assert_eq!(records.last().map(|r| r.seq), Some(25));

        let s = session.read().await;
        assert_eq!(s.aggregator.total(), 25);
        assert_eq!(s.buffer.len(), 25);
        assert_eq!(s.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_model_counts_grow_with_stream() {
        let model = fitted_model();
        let before: u64 = model.read().await.counts().iter().sum();
        let session = SessionState::shared(10);
        let driver = StreamDriver::new(model.clone(), session, (), CancellationToken::new());

        let mut source = SimulatedSource::new(SensorSimulator::new(3), Some(40));
        let (stats, ()) = driver.run(&mut source).await;

        let after: u64 = model.read().await.counts().iter().sum();
        assert_eq!(after - before, stats.processed);
    }

    #[tokio::test]
    async fn test_zero_rate_mode() {
        let model = fitted_model();
        let session = SessionState::shared(100);
        let driver = StreamDriver::new(model, session, Vec::new(), CancellationToken::new())
            .with_rate_mode(RateMode::Zero);

        let readings = vec![
            RawReading::new(10.0, 400.0, 15.0, 75.0, 1.5, 500.0),
            RawReading::new(90.0, 400.0, 15.0, 75.0, 1.5, 500.0),
        ];
        let (_, records) = driver.run(&mut ReplaySource::new(readings)).await;
        assert!(records.iter().all(|r| r.features.pm25_rate == 0.0));
    }

    #[tokio::test]
    async fn test_previous_rate_mode_chains_readings() {
        let model = fitted_model();
        let session = SessionState::shared(100);
        let driver = StreamDriver::new(model, session, Vec::new(), CancellationToken::new());

        let readings = vec![
            RawReading::new(10.0, 400.0, 15.0, 75.0, 1.5, 500.0),
            RawReading::new(90.0, 400.0, 15.0, 75.0, 1.5, 500.0),
        ];
        let (_, records) = driver.run(&mut ReplaySource::new(readings)).await;
        assert_eq!(records[0].features.pm25_rate, 0.0);
        assert_eq!(records[1].features.pm25_rate, 80.0);
    }

    #[tokio::test]
    async fn test_cancel_stops_continuous_stream() {
        let model = fitted_model();
        let session = SessionState::shared(100);
        let token = CancellationToken::new();
        let driver = StreamDriver::new(model, session.clone(), (), token.clone())
            .with_cadence(Duration::from_millis(5));

        let handle = tokio::spawn(async move {
            let mut source = SimulatedSource::new(SensorSimulator::new(9), None);
            driver.run(&mut source).await
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        token.cancel();
        let (stats, ()) = handle.await.unwrap();

        assert_eq!(stats.status, SessionStatus::Cancelled);
        let s = session.read().await;
        assert_eq!(s.status, SessionStatus::Cancelled);
        // No partial sample: every processed sample was tallied
        assert_eq!(s.aggregator.total(), stats.processed);
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_records() {
        let model = fitted_model();
        let session = SessionState::shared(100);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = StreamDriver::new(model, session, tx, CancellationToken::new());

        let mut source = SimulatedSource::new(SensorSimulator::new(5), Some(4));
        let (stats, tx) = driver.run(&mut source).await;
        drop(tx);

        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, stats.processed);
    }

    /// Yields one reading, then breaks.
    struct BrokenSource {
        served: bool,
    }

    #[async_trait::async_trait]
    impl SampleSource for BrokenSource {
        async fn next_reading(&mut self) -> anyhow::Result<SourceEvent> {
            if std::mem::replace(&mut self.served, true) {
                anyhow::bail!("device unplugged");
            }
            Ok(SourceEvent::Reading(RawReading::new(40.0, 400.0, 15.0, 75.0, 1.5, 500.0)))
        }

        fn source_name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_source_error_marks_session_failed() {
        let session = SessionState::shared(10);
        let driver = StreamDriver::new(fitted_model(), session.clone(), (), CancellationToken::new());

        let (stats, ()) = driver.run(&mut BrokenSource { served: false }).await;
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.status, SessionStatus::Failed);
        assert_eq!(session.read().await.status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn test_out_of_range_reading_is_rejected() {
        let model = fitted_model();
        let before = model.read().await.snapshot();
        let session = SessionState::shared(10);
        let driver = StreamDriver::new(model.clone(), session.clone(), Vec::new(), CancellationToken::new());

        let readings = vec![RawReading::new(50.0, 400.0, 15.0, 75.0, 1e308, 500.0)];
        let (stats, records) = driver.run(&mut ReplaySource::new(readings)).await;

        assert_eq!(stats.processed, 0);
        assert_eq!(stats.rejected, 1);
        assert!(records.is_empty());
        assert_eq!(model.read().await.snapshot(), before);
        assert_eq!(session.read().await.rejected, 1);
    }

    #[tokio::test]
    async fn test_closed_consumer_stops_continuous_stream() {
        let session = SessionState::shared(10);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = StreamDriver::new(fitted_model(), session.clone(), tx, CancellationToken::new())
            .with_cadence(Duration::from_millis(1));

        let consumer = tokio::spawn(async move {
            for _ in 0..3 {
                rx.recv().await;
            }
        });

        let mut source = SimulatedSource::new(SensorSimulator::new(2), None);
        let (stats, _tx) = driver.run(&mut source).await;
        consumer.await.unwrap();

        assert_eq!(stats.status, SessionStatus::Cancelled);
        assert!(stats.processed >= 3);
        assert_eq!(session.read().await.aggregator.total(), stats.processed);
    }
}
