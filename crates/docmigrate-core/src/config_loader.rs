//! Configuration loading from files and environment variables.
//!
//! This module provides functions to load [`EngineConfig`] from TOML files
//! and to apply environment variable overrides.
//!
//! ## Loading Order
//!
//! 1. Start with default configuration.
//! 2. Load from a TOML file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Field |
//! |---|---|
//! | `DOCMIGRATE_BATCH_SIZE` | `batch_size` |
//! | `DOCMIGRATE_STRICT_BY_DEFAULT` | `strict_by_default` |
//! | `DOCMIGRATE_VALIDATOR_POPULATION_SIZE` | `validator_population_size` |
//! | `DOCMIGRATE_DETERMINISTIC_SEED` | `deterministic_seed` |
//! | `DOCMIGRATE_LOG_LEVEL` | `log_level` |
//! | `DOCMIGRATE_DEBUG` | `debug` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use docmigrate_core::config_loader;
//!
//! let config = config_loader::from_toml_file_with_env("config/engine.toml").unwrap();
//! ```

use std::path::Path;

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Loads configuration from a TOML string.
///
/// Fields not present in the TOML use the default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<EngineConfig, EngineError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| EngineError::Configuration(format!("failed to parse TOML: {e}")))?;

    let json_value = toml_to_json(toml_value);
    let default_json = serde_json::to_value(EngineConfig::default()).map_err(|e| {
        EngineError::Configuration(format!("failed to serialize default config: {e}"))
    })?;

    let merged = merge_json(default_json, json_value);
    serde_json::from_value(merged)
        .map_err(|e| EngineError::Configuration(format!("failed to deserialize config: {e}")))
}

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<EngineConfig, EngineError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    from_toml_str(&content)
}

/// Loads configuration from a TOML file and then applies environment
/// variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<EngineConfig, EngineError> {
    let mut config = from_toml_file(path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Loads configuration from just environment variables (starting from defaults).
pub fn from_env() -> EngineConfig {
    let mut config = EngineConfig::default();
    apply_env_overrides(&mut config);
    config
}

/// Applies environment variable overrides to a configuration struct.
pub fn apply_env_overrides(config: &mut EngineConfig) {
    if let Ok(val) = std::env::var("DOCMIGRATE_BATCH_SIZE") {
        if let Ok(n) = val.parse::<usize>() {
            config.batch_size = n;
        }
    }

    if let Ok(val) = std::env::var("DOCMIGRATE_STRICT_BY_DEFAULT") {
        config.strict_by_default = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(val) = std::env::var("DOCMIGRATE_VALIDATOR_POPULATION_SIZE") {
        if let Ok(n) = val.parse::<usize>() {
            config.validator_population_size = n;
        }
    }

    if let Ok(val) = std::env::var("DOCMIGRATE_DETERMINISTIC_SEED") {
        if let Ok(n) = val.parse::<u64>() {
            config.deterministic_seed = n;
        }
    }

    if let Ok(val) = std::env::var("DOCMIGRATE_LOG_LEVEL") {
        config.log_level = val;
    }

    if let Ok(val) = std::env::var("DOCMIGRATE_DEBUG") {
        config.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }
}

// ============================================================
// Helpers
// ============================================================

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            batch_size = 50
            strict_by_default = true
            log_level = "debug"
        "#;

        let config = from_toml_str(toml).unwrap();
        assert_eq!(config.batch_size, 50);
        assert!(config.strict_by_default);
        assert_eq!(config.log_level, "debug");
        // Defaults preserved
        assert_eq!(config.validator_population_size, 3);
    }

    #[test]
    fn test_from_toml_str_empty_keeps_defaults() {
        let config = from_toml_str("").unwrap();
        assert_eq!(config.batch_size, EngineConfig::default().batch_size);
    }

    #[test]
    fn test_from_toml_str_malformed() {
        let result = from_toml_str("not = [valid");
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_env_overrides_batch_size() {
        std::env::set_var("DOCMIGRATE_BATCH_SIZE", "77");
        let mut config = EngineConfig::default();
        apply_env_overrides(&mut config);
        assert_eq!(config.batch_size, 77);
        std::env::remove_var("DOCMIGRATE_BATCH_SIZE");
    }

    #[test]
    fn test_apply_env_overrides_strict_by_default() {
        std::env::set_var("DOCMIGRATE_STRICT_BY_DEFAULT", "true");
        let mut config = EngineConfig::default();
        apply_env_overrides(&mut config);
        assert!(config.strict_by_default);
        std::env::remove_var("DOCMIGRATE_STRICT_BY_DEFAULT");
    }

    #[test]
    fn test_from_toml_file_missing() {
        let result = from_toml_file("/nonexistent/path/engine.toml");
        assert!(result.is_err());
    }
}
