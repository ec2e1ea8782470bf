//! Biofilter Sensor Simulation
//!
//! Generates synthetic biofilter sensor readings for testing the engine.
//! Each channel is an independent normal draw around its nominal level
//! (see `SENSOR_PROFILE`); values are raw and may go negative.
//!
//! # Usage
//! ```bash
//! ./simulation --samples 50 --seed 7 | ./biofilter-engine serve --stdin
//! ```

use clap::Parser;
use std::io::{self, Write};
use std::time::Duration;

use biofilter_engine::pipeline::source::SENSOR_PROFILE;
use biofilter_engine::pipeline::SensorSimulator;
use biofilter_engine::types::RawReading;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "biofilter-simulation")]
#[command(about = "Synthetic biofilter sensor readings for biofilter-engine testing")]
#[command(version)]
struct Args {
    /// Number of readings to emit
    #[arg(short = 'n', long, default_value = "50")]
    samples: u64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Delay between readings in milliseconds (0 = as fast as possible)
    #[arg(short, long, default_value = "0")]
    interval_ms: u64,

    /// Output format: json or csv
    #[arg(short, long, default_value = "json")]
    format: String,

    /// Suppress the run log on stderr (only output sensor data)
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Logging
// ============================================================================

/// Run log goes to stderr so stdout stays a clean data stream.
fn log_run(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("[sim] {}", message);
    }
}

fn write_csv_row(out: &mut impl Write, r: &RawReading) -> io::Result<()> {
    writeln!(
        out,
        "{:.4},{:.4},{:.4},{:.4},{:.4},{:.4}",
        r.pm25, r.co2, r.so2, r.moss_humidity, r.pump_activity, r.solar_power
    )
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let format = args.format.to_lowercase();
    if format != "json" && format != "csv" {
        return Err(format!("Unknown format '{}': expected json or csv", args.format).into());
    }

    let mut simulator = match args.seed {
        Some(seed) => SensorSimulator::new(seed),
        None => SensorSimulator::from_entropy(),
    };

    log_run(&"=".repeat(60), args.quiet);
    log_run("BIOFILTER SENSOR SIMULATION", args.quiet);
    log_run(&"=".repeat(60), args.quiet);
    log_run("CHANNELS (mean ± std):", args.quiet);
    let names = ["pm25", "co2", "so2", "moss_humidity", "pump_activity", "solar_power"];
    for (name, (mean, std)) in names.iter().zip(SENSOR_PROFILE.iter()) {
        log_run(&format!("  {:<14} {:>7.1} ± {:.1}", name, mean, std), args.quiet);
    }
    log_run(&format!("  Samples: {}", args.samples), args.quiet);
    if let Some(seed) = args.seed {
        log_run(&format!("  Random seed: {}", seed), args.quiet);
    }
    log_run(&"=".repeat(60), args.quiet);

    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    if format == "csv" {
        writeln!(stdout_lock, "pm25,co2,so2,moss_humidity,pump_activity,solar_power")?;
    }

    let interval = Duration::from_millis(args.interval_ms);
    for i in 0..args.samples {
        let reading = simulator.next_reading();
        if format == "csv" {
            write_csv_row(&mut stdout_lock, &reading)?;
        } else {
            let json = serde_json::to_string(&reading)?;
            writeln!(stdout_lock, "{}", json)?;
        }

        // Flush per line so a downstream pipe sees readings as they are made
        stdout_lock.flush()?;

        if !interval.is_zero() && i + 1 < args.samples {
            std::thread::sleep(interval);
        }
    }

    log_run(&format!("Done: {} readings emitted", args.samples), args.quiet);
    Ok(())
}
