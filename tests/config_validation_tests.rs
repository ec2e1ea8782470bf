//! Config Validation Tests
//!
//! Typo detection (unknown keys with suggestions) and range validation,
//! exercised independently from the rest of the engine.

use biofilter_engine::config::validation::{
    known_config_keys, suggest_correction, validate_ranges, validate_unknown_keys,
};
use biofilter_engine::config::{ConfigError, EngineConfig};
use biofilter_engine::types::RateMode;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_bootstrap_key_warns_with_suggestion() {
    let toml_str = r#"
[bootstrap]
k_mx = 5
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("k_mx"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("bootstrap.k_max"));
}

#[test]
fn typo_in_section_name_warns() {
    let toml_str = r#"
[strem]
cadence_secs = 1.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    // The section and its key are both unknown
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().any(|w| w.suggestion.as_deref() == Some("stream")));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[bootstrap]
batch_size = 400
seed = 7
k_min = 2
k_max = 5
max_iterations = 200
n_init = 4
tolerance = 1e-6
initial_count = 5

[stream]
cadence_secs = 0.5
sample_count = 0
rate_mode = "zero"
seed = 11

[buffer]
capacity = 64

[model]
path = "models/biofilter.json"

[server]
addr = "127.0.0.1:9000"
"#;
    assert!(validate_unknown_keys(toml_str).is_empty());

    let config = EngineConfig::from_toml_str(toml_str).expect("valid config");
    assert_eq!(config.bootstrap.k_max, 5);
    assert_eq!(config.stream.rate_mode, RateMode::Zero);
    assert_eq!(config.stream.sample_limit(), None);
    assert_eq!(config.buffer.capacity, 64);
}

#[test]
fn far_off_key_has_no_suggestion() {
    let warnings = validate_unknown_keys("[buffer]\nwhatever_this_is = 1\n");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].suggestion.is_none());
}

#[test]
fn every_default_key_is_known() {
    let known = known_config_keys();
    let defaults = EngineConfig::default().to_toml().unwrap();
    assert!(validate_unknown_keys(&defaults).is_empty());
    assert!(known.contains("stream.rate_mode"));
    assert_eq!(
        suggest_correction("server.adr", &known).as_deref(),
        Some("server.addr")
    );
}

#[test]
fn unknown_keys_do_not_fail_the_load() {
    let config = EngineConfig::from_toml_str("[buffer]\ncapacty = 10\n").expect("warnings only");
    // Misspelled key is ignored, default applies
    assert_eq!(config.buffer.capacity, 100);
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn default_config_has_no_range_errors() {
    let (errors, warnings) = validate_ranges(&EngineConfig::default());
    assert!(errors.is_empty(), "{errors:?}");
    assert!(warnings.is_empty());
}

#[test]
fn k_min_below_two_is_rejected() {
    let mut config = EngineConfig::default();
    config.bootstrap.k_min = 1;
    let (errors, _) = validate_ranges(&config);
    assert!(errors.iter().any(|e| e.contains("bootstrap.k_min")));
}

#[test]
fn inverted_k_range_is_rejected() {
    let mut config = EngineConfig::default();
    config.bootstrap.k_min = 5;
    config.bootstrap.k_max = 3;
    let (errors, _) = validate_ranges(&config);
    assert!(errors.iter().any(|e| e.contains("bootstrap.k_max")));
}

#[test]
fn batch_smaller_than_k_max_is_rejected() {
    let mut config = EngineConfig::default();
    config.bootstrap.batch_size = 4;
    let (errors, _) = validate_ranges(&config);
    assert!(errors.iter().any(|e| e.contains("bootstrap.batch_size")));
}

#[test]
fn zero_capacity_and_initial_count_are_rejected() {
    let mut config = EngineConfig::default();
    config.buffer.capacity = 0;
    config.bootstrap.initial_count = 0;
    let (errors, _) = validate_ranges(&config);
    assert_eq!(errors.len(), 2, "{errors:?}");
}

#[test]
fn negative_cadence_fails_the_load() {
    let result = EngineConfig::from_toml_str("[stream]\ncadence_secs = -0.5\n");
    match result {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("stream.cadence_secs")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn bad_server_addr_is_rejected() {
    let mut config = EngineConfig::default();
    config.server.addr = "localhost".to_string();
    let (errors, _) = validate_ranges(&config);
    assert!(errors.iter().any(|e| e.contains("server.addr")));
}

#[test]
fn huge_buffer_only_warns() {
    let mut config = EngineConfig::default();
    config.buffer.capacity = 1_000_000;
    let (errors, warnings) = validate_ranges(&config);
    assert!(errors.is_empty());
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field, "buffer.capacity");
}

#[test]
fn config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("biofilter.toml");

    let mut config = EngineConfig::default();
    config.stream.seed = Some(3);
    config.bootstrap.k_max = 4;
    config.save_to_file(&path).unwrap();

    let loaded = EngineConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}
