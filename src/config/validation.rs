//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for EngineConfig.
///
/// Maintained by hand alongside the structs in engine_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [bootstrap]
        "bootstrap",
        "bootstrap.batch_size",
        "bootstrap.seed",
        "bootstrap.k_min",
        "bootstrap.k_max",
        "bootstrap.max_iterations",
        "bootstrap.n_init",
        "bootstrap.tolerance",
        "bootstrap.initial_count",
        // [stream]
        "stream",
        "stream.cadence_secs",
        "stream.sample_count",
        "stream.rate_mode",
        "stream.seed",
        // [buffer]
        "buffer",
        "buffer.capacity",
        // [model]
        "model",
        "model.path",
        // [server]
        "server",
        "server.addr",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.len();
    let b_len = b.len();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist <= 3 {
            if let Some((_, best_dist)) = best {
                if dist < best_dist {
                    best = Some((k, dist));
                }
            } else {
                best = Some((k, dist));
            }
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Unknown keys never fail the load; they only warn.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // serde reports parse errors
    };

    let known = known_config_keys();
    let found = walk_toml_keys(&value, "");
    let mut warnings = Vec::new();

    for key in &found {
        if !known.contains(key.as_str()) {
            let suggestion = suggest_correction(key, &known);
            let message = format!("Unknown config key '{key}'");
            warnings.push(ValidationWarning {
                field: key.clone(),
                message,
                suggestion,
            });
        }
    }

    warnings
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate value ranges on a parsed EngineConfig.
///
/// Returns (errors, warnings). Errors are values the pipeline cannot run
/// with and must prevent startup; warnings are legal but suspicious.
pub fn validate_ranges(config: &super::EngineConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let b = &config.bootstrap;

    // Silhouette needs at least two clusters
    if b.k_min < 2 {
        errors.push(format!("bootstrap.k_min = {} must be >= 2", b.k_min));
    }
    if b.k_max < b.k_min {
        errors.push(format!(
            "bootstrap.k_max = {} must be >= bootstrap.k_min = {}",
            b.k_max, b.k_min
        ));
    }
    if b.batch_size < b.k_max {
        errors.push(format!(
            "bootstrap.batch_size = {} must be >= bootstrap.k_max = {}",
            b.batch_size, b.k_max
        ));
    }
    if b.max_iterations == 0 {
        errors.push("bootstrap.max_iterations must be > 0".to_string());
    }
    if b.n_init == 0 {
        errors.push("bootstrap.n_init must be > 0".to_string());
    }
    if !b.tolerance.is_finite() || b.tolerance < 0.0 {
        errors.push(format!(
            "bootstrap.tolerance = {} must be finite and >= 0",
            b.tolerance
        ));
    }
    // A zero count lets the first streamed point replace the centroid outright
    if b.initial_count == 0 {
        errors.push("bootstrap.initial_count must be > 0".to_string());
    }

    let cadence = config.stream.cadence_secs;
    if !cadence.is_finite() || cadence < 0.0 {
        errors.push(format!(
            "stream.cadence_secs = {} must be finite and >= 0",
            cadence
        ));
    } else if cadence > 3600.0 {
        warnings.push(ValidationWarning {
            field: "stream.cadence_secs".to_string(),
            message: format!("stream.cadence_secs = {:.1} is longer than an hour", cadence),
            suggestion: None,
        });
    }

    if config.buffer.capacity == 0 {
        errors.push("buffer.capacity must be > 0".to_string());
    } else if config.buffer.capacity > 100_000 {
        warnings.push(ValidationWarning {
            field: "buffer.capacity".to_string(),
            message: format!(
                "buffer.capacity = {} is unusually large for a display buffer",
                config.buffer.capacity
            ),
            suggestion: None,
        });
    }

    if config.server.addr.parse::<std::net::SocketAddr>().is_err() {
        errors.push(format!(
            "server.addr = '{}' is not a valid socket address",
            config.server.addr
        ));
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("capacity", "capacity"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("capacty", "capacity"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [stream]
            cadence_secs = 0.5
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"stream".to_string()));
        assert!(keys.contains(&"stream.cadence_secs".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[buffer]
capacty = 50
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].field.contains("capacty"));
        assert_eq!(warnings[0].suggestion.as_deref(), Some("buffer.capacity"));
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[bootstrap]
k_min = 2
k_max = 5

[stream]
rate_mode = "zero"
seed = 7

[model]
path = "model.json"
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_defaults_clean() {
        let (errors, warnings) = validate_ranges(&EngineConfig::default());
        assert!(errors.is_empty(), "Defaults should produce no errors: {:?}", errors);
        assert!(warnings.is_empty(), "Defaults should produce no warnings: {:?}", warnings);
    }

    #[test]
    fn test_k_min_below_two() {
        let mut config = EngineConfig::default();
        config.bootstrap.k_min = 1;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("k_min")));
    }

    #[test]
    fn test_inverted_k_range() {
        let mut config = EngineConfig::default();
        config.bootstrap.k_min = 5;
        config.bootstrap.k_max = 3;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("k_max")));
    }

    #[test]
    fn test_zero_capacity() {
        let mut config = EngineConfig::default();
        config.buffer.capacity = 0;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("buffer.capacity")));
    }

    #[test]
    fn test_negative_cadence() {
        let mut config = EngineConfig::default();
        config.stream.cadence_secs = -0.5;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("cadence_secs")));
    }

    #[test]
    fn test_huge_buffer_warns() {
        let mut config = EngineConfig::default();
        config.buffer.capacity = 1_000_000;
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.field == "buffer.capacity"));
    }

    #[test]
    fn test_bad_server_addr() {
        let mut config = EngineConfig::default();
        config.server.addr = "not-an-address".to_string();
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("server.addr")));
    }
}
