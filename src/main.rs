//! Biofilter Engine - streaming behaviour clustering for biofilter sensors
//!
//! # Usage
//!
//! ```bash
//! # Fit the model once from a seeded synthetic batch
//! cargo run --release -- bootstrap
//!
//! # Serve the HTTP API (default subcommand)
//! cargo run --release
//!
//! # Serve and cluster readings piped in from the simulator
//! ./simulation --samples 50 --seed 7 | ./biofilter-engine serve --stdin
//!
//! # Headless stream, one SampleRecord JSON line per sample on stdout
//! ./biofilter-engine stream --samples 20 --seed 3
//!
//! # Dump the effective configuration to edit
//! ./biofilter-engine init-config biofilter.toml
//! ```
//!
//! # Environment Variables
//!
//! - `BIOFILTER_CONFIG`: Path to the TOML config file
//! - `BIOFILTER_SERVER_ADDR`: HTTP bind address
//! - `BIOFILTER_MODEL_PATH`: Model checkpoint path
//! - `BIOFILTER_CORS_ORIGINS`: Comma-separated allowed CORS origins
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use biofilter_engine::api::{create_app, ApiState};
use biofilter_engine::config::{self, EngineConfig};
use biofilter_engine::ml_engine::{
    self, bootstrap_fit, BootstrapParams, ClusterModel, ModelState, SharedModel,
};
use biofilter_engine::pipeline::{
    SampleSource, SensorSimulator, SessionState, SharedSession, SimulatedSource, StdinSource,
    StreamDriver,
};
use biofilter_engine::types::{RawReading, SampleRecord};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "biofilter-engine")]
#[command(about = "Biofilter sensor behaviour clustering engine")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (takes precedence over BIOFILTER_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// Serve the HTTP API, optionally streaming readings in the background (default)
    Serve(ServeArgs),

    /// Fit a fresh model and write the checkpoint
    Bootstrap {
        /// JSON-lines file of readings; a seeded synthetic batch when absent
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Checkpoint path (default: config `[model] path`)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Synthetic batch size override
        #[arg(long)]
        batch_size: Option<usize>,

        /// Seed override for the synthetic batch and k-means
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Headless streaming session printing SampleRecords as JSON lines
    Stream {
        /// Read JSON readings from stdin instead of the simulator
        #[arg(long)]
        stdin: bool,

        /// Number of simulated samples (0 = until Ctrl+C)
        #[arg(short = 'n', long)]
        samples: Option<u64>,

        /// Simulator seed
        #[arg(long)]
        seed: Option<u64>,

        /// Seconds between samples
        #[arg(long)]
        cadence: Option<f64>,

        /// Checkpoint path
        #[arg(short, long, value_name = "FILE")]
        model: Option<PathBuf>,
    },

    /// Write the effective configuration out as TOML, as a starting point
    InitConfig {
        #[arg(default_value = "biofilter.toml", value_name = "FILE")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Cluster JSON readings from stdin while serving
    /// Use with simulator: ./simulation | ./biofilter-engine serve --stdin
    #[arg(long, conflicts_with = "simulate")]
    stdin: bool,

    /// Run a simulated stream from startup
    #[arg(long)]
    simulate: bool,

    /// Override the server address (default: "0.0.0.0:8000")
    #[arg(short, long)]
    addr: Option<String>,

    /// Checkpoint path
    #[arg(short, long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Fit and save a model when no checkpoint exists
    #[arg(long)]
    auto_bootstrap: bool,

    /// Write the adapted model back to the checkpoint on shutdown
    #[arg(long)]
    persist: bool,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    StreamDriver,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::StreamDriver => write!(f, "StreamDriver"),
        }
    }
}

// ============================================================================
// Configuration & Model Loading
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(p) => EngineConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config from {}", p.display()))?,
        None => EngineConfig::load(),
    };
    Ok(config.with_env_overrides())
}

/// Synthetic batch or JSON-lines file, depending on `input`.
fn bootstrap_batch(input: Option<&Path>, params: &BootstrapParams, batch_size: usize) -> Result<Vec<RawReading>> {
    match input {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read bootstrap input {}", path.display()))?;
            let mut readings = Vec::new();
            for (i, line) in contents.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let value: serde_json::Value = serde_json::from_str(line)
                    .with_context(|| format!("{}:{}: invalid JSON", path.display(), i + 1))?;
                let reading = RawReading::from_json(&value)
                    .with_context(|| format!("{}:{}: invalid reading", path.display(), i + 1))?;
                readings.push(reading);
            }
            info!("📥 Loaded {} bootstrap readings from {}", readings.len(), path.display());
            Ok(readings)
        }
        None => {
            info!(
                "🎲 Generating {} synthetic readings (seed {})",
                batch_size, params.seed
            );
            Ok(SensorSimulator::new(params.seed).batch(batch_size))
        }
    }
}

/// Fit, log the candidate table, and write the checkpoint.
fn run_bootstrap(readings: &[RawReading], params: &BootstrapParams, output: &Path) -> Result<ModelState> {
    let state = bootstrap_fit(readings, params).context("Bootstrap fit failed")?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("📊 BOOTSTRAP RESULT");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for c in &state.candidate_scores {
        let score = c
            .silhouette
            .map_or_else(|| "undefined".to_string(), |s| format!("{:.4}", s));
        let marker = if c.k == state.k() { "  ◄ chosen" } else { "" };
        info!("   K = {}:   silhouette {}{}", c.k, score, marker);
    }
    let ratio = state.projector.explained_variance_ratio();
    info!(
        "   Explained variance: PC1 {:.1}% | PC2 {:.1}%",
        ratio[0] * 100.0,
        ratio[1] * 100.0
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    ml_engine::save_to_disk(&state, output)
        .with_context(|| format!("Failed to write checkpoint {}", output.display()))?;
    info!(k = state.k(), silhouette = ?state.silhouette, path = %output.display(), "✓ Model checkpoint written");
    Ok(state)
}

/// Load the checkpoint, bootstrapping first when asked and it is missing.
fn load_model(path: &Path, auto_bootstrap: bool) -> Option<SharedModel> {
    if !path.exists() && auto_bootstrap {
        info!("📝 No checkpoint at {}, running bootstrap", path.display());
        let cfg = &config::get().bootstrap;
        let params = BootstrapParams::from(cfg);
        let fitted = bootstrap_batch(None, &params, cfg.batch_size)
            .and_then(|batch| run_bootstrap(&batch, &params, path));
        return match fitted.and_then(|state| Ok(ClusterModel::new(state)?)) {
            Ok(model) => Some(ml_engine::shared(model)),
            Err(e) => {
                error!("Auto-bootstrap failed: {:#}", e);
                None
            }
        };
    }

    match ml_engine::load_from_disk(path) {
        Ok(model) => {
            info!(
                k = model.k(),
                path = %path.display(),
                "✓ Loaded model checkpoint ({} clusters)",
                model.k()
            );
            Some(ml_engine::shared(model))
        }
        Err(e) => {
            warn!("⚠ {}: classification and streaming are disabled", e);
            warn!("   Run `biofilter-engine bootstrap` to create {}", path.display());
            None
        }
    }
}

fn spawn_ctrl_c(cancel_token: &CancellationToken) {
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });
}

// ============================================================================
// Serve
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn a background stream that feeds the shared model and session.
fn spawn_stream<S: SampleSource>(
    task_set: &mut JoinSet<Result<TaskName>>,
    mut source: S,
    model: SharedModel,
    session: SharedSession,
    cancel_token: CancellationToken,
) {
    let stream_cfg = config::get().stream.clone();
    task_set.spawn(async move {
        info!("[StreamDriver] Task starting");
        let driver = StreamDriver::new(model, session, (), cancel_token)
            .with_cadence(stream_cfg.cadence())
            .with_rate_mode(stream_cfg.rate_mode);
        let (stats, ()) = driver.run(&mut source).await;
        info!(
            "[StreamDriver] Finished: {} processed, {} rejected",
            stats.processed, stats.rejected
        );
        Ok(TaskName::StreamDriver)
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the remaining tasks observe cancellation and exit
    while let Some(result) = task_set.join_next().await {
        if let Ok(Err(e)) = result {
            warn!("🔒 Supervisor: Task ended with error during shutdown: {}", e);
        }
    }

    Ok(())
}

async fn run_serve(args: ServeArgs, cancel_token: CancellationToken) -> Result<()> {
    let cfg = config::get();
    let server_addr = args.addr.unwrap_or_else(|| cfg.server.addr.clone());
    let model_path = args.model.unwrap_or_else(|| cfg.model.path.clone());

    let model = load_model(&model_path, args.auto_bootstrap);
    let session = SessionState::shared(cfg.buffer.capacity);
    info!("✓ Session state initialized (buffer capacity {})", cfg.buffer.capacity);

    let api_state = ApiState::new(model.clone(), session.clone(), cancel_token.clone())
        .with_stream_defaults(cfg.stream.clone());
    let app = create_app(api_state.clone());

    info!("🌐 Starting HTTP server on {}...", server_addr);
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_addr))?;
    info!("✓ HTTP server listening on {}", server_addr);
    info!("");

    info!("🔒 Supervisor: Initializing task monitoring");
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());

    if args.stdin || args.simulate {
        match model.clone() {
            Some(model) => {
                // Stoppable over the API like any other stream
                session.write().await.mark_started();
                let stream_token = api_state.attach_stream().await;
                if args.stdin {
                    info!("📥 Input: stdin (JSON readings)");
                    spawn_stream(&mut task_set, StdinSource::stdin(), model, session, stream_token);
                } else {
                    let simulator = match cfg.stream.seed {
                        Some(seed) => SensorSimulator::new(seed),
                        None => SensorSimulator::from_entropy(),
                    };
                    info!("📥 Input: simulated sensors");
                    let source = SimulatedSource::new(simulator, cfg.stream.sample_limit());
                    spawn_stream(&mut task_set, source, model, session, stream_token);
                }
            }
            None => warn!("⚠ No model loaded, startup stream skipped"),
        }
    }

    let result = run_supervisor(&mut task_set, cancel_token).await;

    if args.persist {
        if let Some(model) = model {
            let state = model.read().await.snapshot();
            match ml_engine::save_to_disk(&state, &model_path) {
                Ok(()) => info!(path = %model_path.display(), "✓ Adapted model saved"),
                Err(e) => error!("Failed to save adapted model: {}", e),
            }
        }
    }

    result
}

// ============================================================================
// Headless Stream
// ============================================================================

async fn run_stream<S: SampleSource>(
    mut source: S,
    model: SharedModel,
    cadence: Duration,
    cancel_token: CancellationToken,
) -> Result<()> {
    let cfg = config::get();
    let session = SessionState::shared(cfg.buffer.capacity);
    let (tx, mut rx) = mpsc::unbounded_channel::<SampleRecord>();

    // stdout writer runs beside the driver so lines appear as samples land
    let printer = tokio::spawn(async move {
        let stdout = std::io::stdout();
        while let Some(record) = rx.recv().await {
            let line = serde_json::to_string(&record)?;
            let mut out = stdout.lock();
            match writeln!(out, "{}", line).and_then(|()| out.flush()) {
                Ok(()) => {}
                // Reader went away (`| head`); dropping rx stops the driver
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok::<(), anyhow::Error>(())
    });

    let driver = StreamDriver::new(model, session, tx, cancel_token)
        .with_cadence(cadence)
        .with_rate_mode(cfg.stream.rate_mode);
    let (_stats, tx) = driver.run(&mut source).await;
    drop(tx);

    printer.await.context("stdout writer panicked")??;
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for data in `stream` mode
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    config::init(load_config(args.config.as_deref())?);
    let cfg = config::get();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Biofilter Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("  Sensor Behaviour Clustering");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("");

    match args.command.unwrap_or(SubCommand::Serve(ServeArgs::default())) {
        SubCommand::Bootstrap {
            input,
            output,
            batch_size,
            seed,
        } => {
            let mut params = BootstrapParams::from(&cfg.bootstrap);
            if let Some(seed) = seed {
                params.seed = seed;
            }
            let batch_size = batch_size.unwrap_or(cfg.bootstrap.batch_size);
            let output = output.unwrap_or_else(|| cfg.model.path.clone());

            let batch = bootstrap_batch(input.as_deref(), &params, batch_size)?;
            run_bootstrap(&batch, &params, &output)?;
        }

        SubCommand::Stream {
            stdin,
            samples,
            seed,
            cadence,
            model,
        } => {
            let model_path = model.unwrap_or_else(|| cfg.model.path.clone());
            let model = ml_engine::load_from_disk(&model_path)
                .with_context(|| format!("Cannot stream without a model ({})", model_path.display()))?;
            let model = ml_engine::shared(model);

            let cadence = match cadence {
                Some(secs) => Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("Invalid cadence {}", secs))?,
                None => cfg.stream.cadence(),
            };

            let cancel_token = CancellationToken::new();
            spawn_ctrl_c(&cancel_token);

            if stdin {
                info!("📥 Input: stdin (JSON readings)");
                run_stream(StdinSource::stdin(), model, cadence, cancel_token).await?;
            } else {
                let limit = match samples {
                    Some(0) => None,
                    Some(n) => Some(n),
                    None => cfg.stream.sample_limit(),
                };
                let simulator = match seed.or(cfg.stream.seed) {
                    Some(s) => SensorSimulator::new(s),
                    None => SensorSimulator::from_entropy(),
                };
                info!("📥 Input: simulated sensors");
                run_stream(SimulatedSource::new(simulator, limit), model, cadence, cancel_token).await?;
            }
        }

        SubCommand::InitConfig { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            cfg.save_to_file(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("✓ Config written to {}", path.display());
        }

        SubCommand::Serve(serve_args) => {
            let cancel_token = CancellationToken::new();
            spawn_ctrl_c(&cancel_token);
            run_serve(serve_args, cancel_token).await?;
        }
    }

    info!("");
    info!("✓ Biofilter Engine shutdown complete");
    Ok(())
}
