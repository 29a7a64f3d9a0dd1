//! # docmigrate-core
//!
//! Core types, configuration, and error types for the document-store
//! migration engine. This crate has zero storage-backend dependencies and
//! provides the foundation the `docmigrate-store` and `docmigrate-engine`
//! crates build on.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`utils`] - Utility types (`LazyObject`, text helpers)
//! - [`config`] - Engine configuration and global configuration cell
//! - [`config_loader`] - TOML/environment configuration loading
//! - [`logging`] - Tracing-based logging integration

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod utils;

// Re-export the most commonly used types at the crate root.
pub use config::{EngineConfig, CONFIG};
pub use error::{EngineError, EngineResult, SchemaIssue};
