//! Configuration for the migration engine.
//!
//! This module provides the [`EngineConfig`] struct, which holds the
//! tunables the orchestrator and validator need, and [`LazyConfig`], a
//! globally-accessible, lazily-initialized configuration instance.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Tunable configuration for the migration engine.
///
/// # Examples
///
/// ```
/// use docmigrate_core::config::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.batch_size, 500);
/// assert!(!config.strict_by_default);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of documents read/written per batch during a real-store
    /// migration and during fan-out seeding.
    pub batch_size: usize,

    /// Default value for a migration's `strict` mode when a chain or
    /// orchestrator call does not specify one explicitly.
    pub strict_by_default: bool,

    /// Number of mock instances generated per multi-model/multi-collection
    /// type when the simulation validator has to fall back to synthetic
    /// population (no real instances registered yet).
    pub validator_population_size: usize,

    /// Seed for the deterministic pseudo-random generator used to build
    /// synthetic validator populations and mock documents. Fixing this
    /// makes validation runs reproducible across invocations.
    pub deterministic_seed: u64,

    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,

    /// Whether debug-mode (pretty, human-readable) logging is used instead
    /// of structured JSON output.
    pub debug: bool,

    /// Escape hatch for configuration values that don't fit the fields above.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            strict_by_default: false,
            validator_population_size: 3,
            deterministic_seed: 0,
            log_level: "info".to_string(),
            debug: true,
            extra: HashMap::new(),
        }
    }
}

/// A lazily-initialized, globally-accessible configuration container.
///
/// Call [`configure`](LazyConfig::configure) once at startup to set the
/// configuration, then use [`get`](LazyConfig::get) to access it.
///
/// # Panics
///
/// [`get`](LazyConfig::get) panics if the configuration has not been
/// configured. [`configure`](LazyConfig::configure) panics if called more
/// than once.
pub struct LazyConfig {
    inner: OnceLock<EngineConfig>,
}

impl Default for LazyConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyConfig {
    /// Creates a new, unconfigured `LazyConfig`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global config. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if the config has already been configured.
    pub fn configure(&self, config: EngineConfig) {
        self.inner
            .set(config)
            .expect("EngineConfig has already been configured");
    }

    /// Returns a reference to the configured config.
    ///
    /// # Panics
    ///
    /// Panics if the config has not been configured.
    pub fn get(&self) -> &EngineConfig {
        self.inner
            .get()
            .expect("EngineConfig has not been configured. Call CONFIG.configure() first.")
    }

    /// Returns `true` if the config has been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global configuration instance.
///
/// Call `CONFIG.configure(config)` once at application startup, then access
/// configuration via `CONFIG.get()` anywhere in the engine.
pub static CONFIG: LazyConfig = LazyConfig::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let c = EngineConfig::default();
        assert_eq!(c.batch_size, 500);
        assert!(!c.strict_by_default);
        assert_eq!(c.validator_population_size, 3);
        assert_eq!(c.log_level, "info");
        assert!(c.debug);
    }

    #[test]
    fn test_lazy_config_configure_and_get() {
        let lazy = LazyConfig::new();
        assert!(!lazy.is_configured());

        let mut config = EngineConfig::default();
        config.batch_size = 10;
        config.strict_by_default = true;

        lazy.configure(config);
        assert!(lazy.is_configured());
        assert_eq!(lazy.get().batch_size, 10);
        assert!(lazy.get().strict_by_default);
    }

    #[test]
    #[should_panic(expected = "already been configured")]
    fn test_lazy_config_double_configure_panics() {
        let lazy = LazyConfig::new();
        lazy.configure(EngineConfig::default());
        lazy.configure(EngineConfig::default());
    }

    #[test]
    #[should_panic(expected = "not been configured")]
    fn test_lazy_config_get_before_configure_panics() {
        let lazy = LazyConfig::new();
        let _ = lazy.get();
    }
}
