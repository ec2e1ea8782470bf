//! Engine Configuration - bootstrap, streaming and server settings as TOML
//!
//! Every section implements `Default` with the built-in constants from
//! [`super::defaults`], so an empty or missing file behaves exactly like
//! the stock deployment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::ml_engine::BootstrapParams;
use crate::types::RateMode;

/// Env var naming an explicit config file.
pub const CONFIG_ENV: &str = "BIOFILTER_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "biofilter.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a biofilter engine deployment.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$BIOFILTER_CONFIG` env var
/// 2. `./biofilter.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// One-time model fit
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Streaming sessions
    #[serde(default)]
    pub stream: StreamConfig,

    /// Recent-sample buffer
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Model checkpoint
    #[serde(default)]
    pub model: ModelConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerConfig,
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$BIOFILTER_CONFIG` environment variable
    /// 2. `./biofilter.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded engine config from {}", CONFIG_ENV);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV);
            }
        }

        // 2. Check ./biofilter.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded engine config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate TOML text.
    ///
    /// Unknown keys are logged as warnings; range violations are errors.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BIOFILTER_SERVER_ADDR` and `BIOFILTER_MODEL_PATH` on top of
    /// the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var("BIOFILTER_SERVER_ADDR") {
            info!(addr = %addr, "Server address overridden by BIOFILTER_SERVER_ADDR");
            self.server.addr = addr;
        }
        if let Ok(path) = std::env::var("BIOFILTER_MODEL_PATH") {
            info!(path = %path, "Model path overridden by BIOFILTER_MODEL_PATH");
            self.model.path = PathBuf::from(path);
        }
        self
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Engine config saved");
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Bootstrap
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Synthetic batch size
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_bootstrap_seed")]
    pub seed: u64,

    #[serde(default = "default_k_min")]
    pub k_min: usize,

    #[serde(default = "default_k_max")]
    pub k_max: usize,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_n_init")]
    pub n_init: usize,

    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Starting observation count of every centroid
    #[serde(default = "default_initial_count")]
    pub initial_count: u64,
}

fn default_batch_size() -> usize { defaults::BOOTSTRAP_BATCH_SIZE }
fn default_bootstrap_seed() -> u64 { defaults::BOOTSTRAP_SEED }
fn default_k_min() -> usize { defaults::K_MIN }
fn default_k_max() -> usize { defaults::K_MAX }
fn default_max_iterations() -> usize { defaults::KMEANS_MAX_ITERATIONS }
fn default_n_init() -> usize { defaults::KMEANS_N_INIT }
fn default_tolerance() -> f64 { defaults::KMEANS_TOLERANCE }
fn default_initial_count() -> u64 { defaults::INITIAL_CENTROID_COUNT }

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            seed: default_bootstrap_seed(),
            k_min: default_k_min(),
            k_max: default_k_max(),
            max_iterations: default_max_iterations(),
            n_init: default_n_init(),
            tolerance: default_tolerance(),
            initial_count: default_initial_count(),
        }
    }
}

impl From<&BootstrapConfig> for BootstrapParams {
    fn from(cfg: &BootstrapConfig) -> Self {
        Self {
            k_min: cfg.k_min,
            k_max: cfg.k_max,
            seed: cfg.seed,
            max_iterations: cfg.max_iterations,
            n_init: cfg.n_init,
            tolerance: cfg.tolerance,
            initial_count: cfg.initial_count,
        }
    }
}

// ============================================================================
// Streaming
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Pause between samples in seconds
    #[serde(default = "default_cadence_secs")]
    pub cadence_secs: f64,

    /// Samples per session; 0 streams until cancelled
    #[serde(default = "default_sample_count")]
    pub sample_count: u64,

    /// How the particulate rate-of-change is computed for streamed samples
    #[serde(default)]
    pub rate_mode: RateMode,

    /// Simulator seed; absent means entropy-seeded
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_cadence_secs() -> f64 { defaults::STREAM_CADENCE_SECS }
fn default_sample_count() -> u64 { defaults::STREAM_SAMPLE_COUNT }

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            cadence_secs: default_cadence_secs(),
            sample_count: default_sample_count(),
            rate_mode: RateMode::default(),
            seed: None,
        }
    }
}

impl StreamConfig {
    /// Cadence as a `Duration`. Invalid values collapse to zero.
    pub fn cadence(&self) -> Duration {
        Duration::try_from_secs_f64(self.cadence_secs).unwrap_or(Duration::ZERO)
    }

    /// `None` for a continuous session.
    pub fn sample_limit(&self) -> Option<u64> {
        (self.sample_count > 0).then_some(self.sample_count)
    }
}

// ============================================================================
// Buffer / Model / Server
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize { defaults::DEFAULT_BUFFER_CAPACITY }

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Checkpoint file. Overridden by `BIOFILTER_MODEL_PATH` or `--model`.
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
}

fn default_model_path() -> PathBuf { PathBuf::from(defaults::MODEL_PATH) }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by `BIOFILTER_SERVER_ADDR` env var or `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String { defaults::SERVER_ADDR.to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}
