//! Engine Configuration Module
//!
//! Bootstrap, streaming, buffer, checkpoint and server settings loaded from
//! TOML, with built-in defaults for every field.
//!
//! ## Loading Order
//!
//! 1. `BIOFILTER_CONFIG` environment variable (path to TOML file)
//! 2. `biofilter.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(EngineConfig::load().with_env_overrides());
//!
//! // Anywhere in the codebase:
//! let capacity = config::get().buffer.capacity;
//! ```

mod engine_config;
pub mod defaults;
pub mod validation;

pub use engine_config::*;

use std::sync::OnceLock;

/// Global engine configuration, initialized once at startup.
static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global engine configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: EngineConfig) {
    if ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global engine configuration.
///
/// Falls back to built-in defaults if `init()` has not been called, which
/// keeps library callers and tests working without a startup step.
pub fn get() -> &'static EngineConfig {
    ENGINE_CONFIG.get_or_init(EngineConfig::default)
}
