//! Sample source abstraction for sensor reading ingestion.
//!
//! Provides a unified trait for pulling raw readings from different sources:
//! the seeded simulator, an in-memory replay batch, and JSON lines on stdin.

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::types::RawReading;

/// Events produced by a sample source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A well-formed reading.
    Reading(RawReading),
    /// Input that failed validation; never reaches the pipeline.
    Rejected(String),
    /// No more data.
    Eof,
}

/// Trait abstracting where raw readings come from.
///
/// The stream driver calls [`next_reading`](SampleSource::next_reading)
/// inside a `select!` with its cancellation token, so implementations may
/// block for as long as they need.
#[async_trait]
pub trait SampleSource: Send + 'static {
    /// Pull the next event. `Err` means the source is broken for good.
    async fn next_reading(&mut self) -> Result<SourceEvent>;

    /// Human-readable name for logging (e.g. "simulated", "stdin").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Sensor Simulator
// ============================================================================

/// (mean, std) of each raw channel, in `RawReading` field order.
pub const SENSOR_PROFILE: [(f64, f64); 6] = [
    (50.0, 20.0),   // pm25
    (400.0, 50.0),  // co2
    (15.0, 5.0),    // so2
    (75.0, 15.0),   // moss_humidity
    (1.5, 0.5),     // pump_activity
    (500.0, 150.0), // solar_power
];

/// Seeded generator of independent normally-distributed sensor readings.
///
/// Values are raw: noisy draws can go negative and are left for the
/// feature engineer to clamp.
pub struct SensorSimulator {
    rng: StdRng,
}

impl SensorSimulator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Entropy-seeded simulator for non-reproducible runs.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn next_reading(&mut self) -> RawReading {
        let mut v = [0.0; 6];
        for (slot, &(mean, std)) in v.iter_mut().zip(SENSOR_PROFILE.iter()) {
            let z: f64 = self.rng.sample(StandardNormal);
            *slot = mean + std * z;
        }
        RawReading::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }

    /// A bootstrap-sized batch.
    pub fn batch(&mut self, n: usize) -> Vec<RawReading> {
        (0..n).map(|_| self.next_reading()).collect()
    }
}

// ============================================================================
// Simulated Source
// ============================================================================

/// Streams simulator readings, either a fixed count or forever.
pub struct SimulatedSource {
    simulator: SensorSimulator,
    remaining: Option<u64>,
}

impl SimulatedSource {
    /// `sample_count = None` streams until cancelled.
    pub fn new(simulator: SensorSimulator, sample_count: Option<u64>) -> Self {
        Self {
            simulator,
            remaining: sample_count,
        }
    }
}

#[async_trait]
impl SampleSource for SimulatedSource {
    async fn next_reading(&mut self) -> Result<SourceEvent> {
        match self.remaining.as_mut() {
            Some(0) => return Ok(SourceEvent::Eof),
            Some(n) => *n -= 1,
            None => {}
        }
        Ok(SourceEvent::Reading(self.simulator.next_reading()))
    }

    fn source_name(&self) -> &str {
        "simulated"
    }
}

// ============================================================================
// Replay Source (in-memory batch)
// ============================================================================

/// Replays a pre-loaded batch of readings in order.
pub struct ReplaySource {
    readings: std::vec::IntoIter<RawReading>,
}

impl ReplaySource {
    pub fn new(readings: Vec<RawReading>) -> Self {
        Self {
            readings: readings.into_iter(),
        }
    }
}

#[async_trait]
impl SampleSource for ReplaySource {
    async fn next_reading(&mut self) -> Result<SourceEvent> {
        Ok(self
            .readings
            .next()
            .map_or(SourceEvent::Eof, SourceEvent::Reading))
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// JSON Line Source (stdin)
// ============================================================================

/// Reads one JSON reading per line.
///
/// Used with the simulation harness:
/// `simulation --samples 50 | biofilter-engine serve --stdin`
pub struct JsonLineSource<R> {
    reader: R,
    line_buffer: Vec<u8>,
    name: &'static str,
}

/// Line source over the process's standard input.
pub type StdinSource = JsonLineSource<BufReader<tokio::io::Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        JsonLineSource::with_name(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl<R> JsonLineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self::with_name(reader, "json-lines")
    }

    fn with_name(reader: R, name: &'static str) -> Self {
        Self {
            reader,
            line_buffer: Vec::with_capacity(256),
            name,
        }
    }
}

#[async_trait]
impl<R> SampleSource for JsonLineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn next_reading(&mut self) -> Result<SourceEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_until(b'\n', &mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(SourceEvent::Eof);
            }
            // A bad line is rejected on its own; the stream keeps going
            let Ok(line) = std::str::from_utf8(&self.line_buffer) else {
                return Ok(SourceEvent::Rejected("invalid UTF-8".to_string()));
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let value: serde_json::Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => return Ok(SourceEvent::Rejected(format!("invalid JSON: {}", e))),
            };
            return Ok(match RawReading::from_json(&value) {
                Ok(reading) => SourceEvent::Reading(reading),
                Err(e) => SourceEvent::Rejected(e.to_string()),
            });
        }
    }

    fn source_name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_simulator_is_seeded() {
        let a = SensorSimulator::new(7).batch(20);
        let b = SensorSimulator::new(7).batch(20);
        let c = SensorSimulator::new(8).batch(20);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_simulator_matches_profile() {
        let batch = SensorSimulator::new(42).batch(2000);
        let mean_co2 = batch.iter().map(|r| r.co2).sum::<f64>() / batch.len() as f64;
        assert!((mean_co2 - 400.0).abs() < 5.0, "mean co2 = {}", mean_co2);
    }

    #[tokio::test]
    async fn test_simulated_source_finite() {
        let mut src = SimulatedSource::new(SensorSimulator::new(1), Some(3));
        for _ in 0..3 {
            assert!(matches!(src.next_reading().await.unwrap(), SourceEvent::Reading(_)));
        }
        assert_eq!(src.next_reading().await.unwrap(), SourceEvent::Eof);
    }

    #[tokio::test]
    async fn test_replay_source_in_order() {
        let r1 = RawReading::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        let r2 = RawReading::new(6.0, 5.0, 4.0, 3.0, 2.0, 1.0);
        let mut src = ReplaySource::new(vec![r1, r2]);
        assert_eq!(src.next_reading().await.unwrap(), SourceEvent::Reading(r1));
        assert_eq!(src.next_reading().await.unwrap(), SourceEvent::Reading(r2));
        assert_eq!(src.next_reading().await.unwrap(), SourceEvent::Eof);
    }

    #[tokio::test]
    async fn test_json_lines_rejects_bad_lines() {
        let input = concat!(
            "{\"pm25\": 50, \"co2\": 400, \"so2\": 15, \"moss_humidity\": 75, \"pump_activity\": 1.5, \"solar_power\": 500}\n",
            "\n",
            "not json\n",
            "{\"pm25\": 50, \"co2\": 400}\n",
            "{\"PM25\": 10, \"CO2\": 420, \"SO2\": 12, \"Moss_Humidity\": 70, \"Pump_Activity\": 1, \"Solar_Power\": 300}\n",
        );
        let mut src = JsonLineSource::new(Cursor::new(input.as_bytes().to_vec()));

        assert!(matches!(src.next_reading().await.unwrap(), SourceEvent::Reading(_)));
        assert!(matches!(src.next_reading().await.unwrap(), SourceEvent::Rejected(_)));
        match src.next_reading().await.unwrap() {
            SourceEvent::Rejected(reason) => assert!(reason.contains("so2"), "{}", reason),
            other => panic!("expected rejection, got {:?}", other),
        }
        match src.next_reading().await.unwrap() {
            SourceEvent::Reading(r) => assert_eq!(r.pm25, 10.0),
            other => panic!("expected reading, got {:?}", other),
        }
        assert_eq!(src.next_reading().await.unwrap(), SourceEvent::Eof);
    }

    #[tokio::test]
    async fn test_json_lines_skips_invalid_utf8() {
        let mut input = b"\xff\xfe garbage\n".to_vec();
        input.extend_from_slice(
            b"{\"pm25\": 5, \"co2\": 410, \"so2\": 9, \"moss_humidity\": 80, \"pump_activity\": 2, \"solar_power\": 100}\n",
        );
        let mut src = JsonLineSource::new(Cursor::new(input));

        match src.next_reading().await.unwrap() {
            SourceEvent::Rejected(reason) => assert!(reason.contains("UTF-8"), "{}", reason),
            other => panic!("expected rejection, got {:?}", other),
        }
        match src.next_reading().await.unwrap() {
            SourceEvent::Reading(r) => assert_eq!(r.co2, 410.0),
            other => panic!("expected reading, got {:?}", other),
        }
        assert_eq!(src.next_reading().await.unwrap(), SourceEvent::Eof);
    }
}
