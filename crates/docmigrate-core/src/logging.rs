//! Logging integration for the migration engine.
//!
//! Provides a helper for configuring [`tracing`]-based logging from
//! [`EngineConfig`](crate::config::EngineConfig).

use crate::config::EngineConfig;

/// Sets up the global tracing subscriber based on the given configuration.
///
/// The log level is read from `config.log_level` (e.g. "debug", "info",
/// "warn", "error"). In debug mode a pretty, human-readable format is used;
/// otherwise a structured JSON format is used, suited to aggregation by a
/// log pipeline.
pub fn setup_logging(config: &EngineConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}
