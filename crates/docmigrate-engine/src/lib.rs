//! # docmigrate-engine
//!
//! The schema migration kernel: compiles a migration's imperative steps
//! into a [`plan::Plan`], applies it either against an in-memory simulation
//! (for pre-flight validation) or a live document store, and tracks which
//! physical instances of a multi-model template have received which
//! migration.
//!
//! ## Module overview
//!
//! - [`schema`] - schema adapter: field maps, tagged unions, index
//!   annotation, store validator emission, deterministic mock-document
//!   generation.
//! - [`plan`] / [`builder`] - the closed operation IR and the two-level
//!   builder that compiles a migration's target schemas and imperative
//!   steps into a [`plan::Plan`].
//! - [`simulate`] - a pure, copy-on-write apply/reverse over an in-memory
//!   database snapshot.
//! - [`real_applier`] - the same operation semantics executed against a
//!   live [`docmigrate_store::DocumentStore`], with validator suspension,
//!   index synchronization, and batched I/O.
//! - [`registry`] - multi-instance discovery, the version guard, and
//!   idempotent migration-lineage recording.
//! - [`migration`] - a single migration record and the linear chain it
//!   forms.
//! - [`validator`] - runs a migration's plan against a synthetic population
//!   to catch schema and reversibility problems before it ever touches a
//!   real store.
//! - [`orchestrator`] - drives one migration's plan end to end: validator
//!   suspension, op execution, resync, lineage recording.
//! - [`ids`] - migration ID generation and the timestamp-prefix version
//!   guard shared by [`registry`] and [`orchestrator`].

#![allow(clippy::too_many_lines)]
#![allow(clippy::result_large_err)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod builder;
pub mod ids;
pub mod migration;
pub mod orchestrator;
pub mod plan;
pub mod real_applier;
pub mod registry;
pub mod schema;
pub mod simulate;
pub mod validator;

pub use builder::PlanBuilder;
pub use migration::{Migration, MigrationChain};
pub use orchestrator::{apply_migration, Direction};
pub use plan::{Op, Plan, PlanProperty};
pub use registry::RecordedOperation;
pub use schema::{CollectionSchema, FieldMap, FieldSchema, FieldType, SchemaAdapter, SchemaSet, UnionSchema};
pub use simulate::SimulatedDatabase;
pub use validator::{validate, ValidationIssue, ValidationIssueKind, ValidatorConfig};
