//! # docmigrate-store
//!
//! The narrow document-store interface the migration engine is driven
//! against, plus an in-memory implementation used for tests and local
//! experimentation.
//!
//! Real deployments implement [`DocumentStore`] against their own document
//! database driver; this crate does not ship one.

pub mod document_store;
pub mod memory;

pub use document_store::{
    BulkWriteOp, Document, DocumentStore, Filter, IndexInfo, IndexSpec, ValidationLevel,
    ValidatorSpec,
};
pub use memory::MemoryStore;
