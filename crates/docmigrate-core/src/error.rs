//! Core error types for the migration engine.
//!
//! [`EngineError`] covers every failure kind the kernel can produce, grouped
//! by the taxonomy the engine itself reasons about (structural, schema
//! violation, reversibility, chain, transform) rather than by which
//! component raised it. Race/benign store errors (index already exists,
//! `dropIndex` on a missing index) are deliberately not part of this enum —
//! they are logged and swallowed at the call site, never propagated.

use std::fmt;

use thiserror::Error;

/// A single schema-validation issue produced by [`crate`]'s parse step.
///
/// Mirrors the shape a schema adapter reports back: a path into the
/// document, a human-readable message, and a short machine-checkable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// Dot-joined path to the offending field (empty string for the document root).
    pub path: String,
    /// Human-readable description of the violation.
    pub message: String,
    /// A short code identifying the kind of violation (e.g. "required", "type").
    pub code: String,
}

impl SchemaIssue {
    /// Creates a new schema issue.
    pub fn new(path: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.code, self.message)
        } else {
            write!(f, "{} ({}): {}", self.path, self.code, self.message)
        }
    }
}

/// The primary error type for the migration kernel.
///
/// Each variant maps to one row of the error taxonomy documented for the
/// kernel: structural errors (missing/duplicate collections or instances),
/// schema violations (a seeded or transformed document fails `parse`),
/// reversibility failures (forward-then-reverse drifts, or a plan marked
/// irreversible is asked to reverse anyway), chain errors (duplicate IDs,
/// bad parents), and transform failures (the `up`/`down` closure itself
/// errors out).
#[derive(Error, Debug)]
pub enum EngineError {
    /// A collection/instance is missing where required, or already exists
    /// where creation was requested in strict mode.
    #[error("structural error: {0}")]
    Structural(String),

    /// A document failed to validate against its declared schema.
    #[error("schema violation in {collection}{}: {}", type_name.as_ref().map(|t| format!(" (type {t})")).unwrap_or_default(), issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    SchemaViolation {
        /// The collection (or instance) the document belongs to.
        collection: String,
        /// The tagged type name, for multi-collections/multi-models.
        type_name: Option<String>,
        /// The issues reported by the schema adapter's `parse` step.
        issues: Vec<SchemaIssue>,
    },

    /// Forward-then-reverse did not reproduce the starting population, or a
    /// plan/operation marked `irreversible` was asked to reverse.
    #[error("reversibility error: {0}")]
    Reversibility(String),

    /// The migration chain is malformed (duplicate ID, bad parent, file-order mismatch).
    #[error("migration chain error: {0}")]
    Chain(String),

    /// A user-supplied `up`/`down` closure returned an error.
    #[error("transform failed: {0}")]
    TransformFailed(String),

    /// A configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An error occurred serializing/deserializing a document or schema.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred (e.g. reading a config file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for constructing a [`EngineError::SchemaViolation`] with a single issue.
    pub fn schema_violation(
        collection: impl Into<String>,
        type_name: Option<String>,
        issue: SchemaIssue,
    ) -> Self {
        Self::SchemaViolation {
            collection: collection.into(),
            type_name,
            issues: vec![issue],
        }
    }

    /// Returns `true` if this error kind is the "race/benign" store-error
    /// family that callers are expected to log and swallow rather than
    /// propagate. The engine never constructs this variant itself; it is
    /// provided so callers can classify errors bubbling up from a
    /// `DocumentStore` implementation.
    pub fn is_benign_store_race(message: &str) -> bool {
        let lowered = message.to_lowercase();
        lowered.contains("already exists") || lowered.contains("indexnotfound") || lowered.contains("index not found")
    }
}

/// A convenience alias for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_issue_display_with_path() {
        let issue = SchemaIssue::new("age", "must be a number", "type");
        assert_eq!(issue.to_string(), "age (type): must be a number");
    }

    #[test]
    fn test_schema_issue_display_root() {
        let issue = SchemaIssue::new("", "missing field age", "required");
        assert_eq!(issue.to_string(), "required: missing field age");
    }

    #[test]
    fn test_schema_violation_display() {
        let err = EngineError::schema_violation(
            "users",
            Some("admin".to_string()),
            SchemaIssue::new("age", "must be a number", "type"),
        );
        let s = err.to_string();
        assert!(s.contains("users"));
        assert!(s.contains("admin"));
        assert!(s.contains("age"));
    }

    #[test]
    fn test_is_benign_store_race() {
        assert!(EngineError::is_benign_store_race("index already exists"));
        assert!(EngineError::is_benign_store_race("IndexNotFound"));
        assert!(!EngineError::is_benign_store_race("connection refused"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let engine_err: EngineError = io_err.into();
        assert!(engine_err.to_string().contains("file missing"));
    }
}
