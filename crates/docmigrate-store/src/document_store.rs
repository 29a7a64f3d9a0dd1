//! The narrow document-store interface the migration engine depends on.
//!
//! This module defines the [`DocumentStore`] trait that any backing store
//! must satisfy to be driven by the real applier (`docmigrate-engine`'s
//! `real_applier` module). The trait intentionally mirrors a document
//! database's native surface (`listCollections`, `collMod`, `insertMany`,
//! `bulkWrite`, `createIndex`, …) rather than a relational one: the engine
//! does not compile queries, it issues collection-scoped CRUD and index
//! operations directly.

use std::collections::BTreeMap;

use docmigrate_core::error::EngineResult;
use serde_json::{Map, Value};

/// A document is a JSON object. `_id` is a conventional (not enforced by
/// this trait) key used by the engine to identify documents for replace
/// and delete operations.
pub type Document = Map<String, Value>;

/// A store-side validator, expressed in the JSON-Schema-like format the
/// spec's `emitStoreValidator` produces (`bsonType`, `properties`,
/// `required`, etc.).
pub type ValidatorSpec = Value;

/// Whether a collection's validator rejects non-conforming writes
/// (`"strict"`) or only warns (`"off"` disables validation entirely, which
/// is what the engine requests while a migration's operations run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    /// The validator rejects writes that do not satisfy it.
    Strict,
    /// No document-shape validation is performed.
    Off,
}

/// An equality filter over top-level document fields, in field-declaration
/// order. Sufficient for everything the engine needs: `_id` lookups and
/// `_type` scoping.
#[derive(Debug, Clone, Default)]
pub struct Filter(pub BTreeMap<String, Value>);

impl Filter {
    /// An empty filter, matching every document in the collection.
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter matching documents whose `_id` equals the given value.
    pub fn by_id(id: impl Into<Value>) -> Self {
        let mut map = BTreeMap::new();
        map.insert("_id".to_string(), id.into());
        Self(map)
    }

    /// Returns `true` if the given document satisfies this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        self.0
            .iter()
            .all(|(k, v)| doc.get(k).is_some_and(|actual| actual == v))
    }
}

/// The desired shape of an index, as produced by a schema adapter's
/// `extractIndexes` and consumed by index synchronization.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// The index name. When `None`, the store assigns one from the key spec.
    pub name: Option<String>,
    /// Ordered field -> direction (`1` ascending, `-1` descending) pairs.
    pub key: Vec<(String, i32)>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Whether the index omits documents missing the indexed field(s).
    pub sparse: bool,
    /// An opaque collation specification, compared for equality only.
    pub collation: Option<Value>,
    /// An opaque partial-filter expression, compared for equality only.
    pub partial_filter_expression: Option<Value>,
}

impl IndexSpec {
    /// Compares the option portion of two index specs (everything except
    /// `name`), the portion index synchronization uses to decide whether an
    /// existing index can be reused as-is.
    pub fn options_eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.unique == other.unique
            && self.sparse == other.sparse
            && self.collation == other.collation
            && self.partial_filter_expression == other.partial_filter_expression
    }
}

/// An existing index as reported by the store, pairing its assigned name
/// with the spec it was created from.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    /// The index's name in the store.
    pub name: String,
    /// The spec the index was created with.
    pub spec: IndexSpec,
}

/// A single operation in a bulk write, as used by batched transform and
/// seed writes.
#[derive(Debug, Clone)]
pub enum BulkWriteOp {
    /// Inserts a new document.
    InsertOne(Document),
    /// Replaces the document matching `_id` with `replacement` in full.
    ReplaceById { id: Value, replacement: Document },
    /// Deletes every document whose `_id` is in `ids`.
    DeleteByIds { ids: Vec<Value> },
}

/// The narrow document-store interface the engine is built against.
///
/// All methods are async because store operations are inherently I/O-bound.
/// Implementations backed by synchronous drivers are expected to wrap calls
/// in their runtime's blocking-task facility to preserve this interface.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Lists collection names, optionally filtered by a name substring.
    async fn list_collections(&self, name_filter: Option<&str>) -> EngineResult<Vec<String>>;

    /// Creates a collection, optionally installing a validator at creation time.
    async fn create_collection(
        &self,
        name: &str,
        validator: Option<ValidatorSpec>,
    ) -> EngineResult<()>;

    /// Equivalent to a `collMod` command: replaces a collection's validator
    /// and validation level. Passing `validator: None` with
    /// [`ValidationLevel::Off`] disables validation entirely, which the
    /// engine does at the start of every migration.
    async fn set_validator(
        &self,
        name: &str,
        validator: Option<ValidatorSpec>,
        level: ValidationLevel,
    ) -> EngineResult<()>;

    /// Drops a collection and all its documents and indexes.
    async fn drop_collection(&self, name: &str) -> EngineResult<()>;

    /// Inserts a single document.
    async fn insert_one(&self, collection: &str, doc: Document) -> EngineResult<()>;

    /// Inserts many documents in one call.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> EngineResult<()>;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(&self, collection: &str, filter: &Filter) -> EngineResult<Option<Document>>;

    /// Returns documents matching `filter`, skipping `skip` and limited to
    /// `limit` (if given), in insertion order.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        skip: usize,
        limit: Option<usize>,
    ) -> EngineResult<Vec<Document>>;

    /// Replaces the first document matching `filter` with `replacement` in full.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        replacement: Document,
    ) -> EngineResult<()>;

    /// Deletes every document matching `filter`, returning the count removed.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> EngineResult<u64>;

    /// Executes a batch of writes against one collection.
    async fn bulk_write(&self, collection: &str, ops: Vec<BulkWriteOp>) -> EngineResult<()>;

    /// Lists the indexes currently defined on a collection.
    async fn list_indexes(&self, collection: &str) -> EngineResult<Vec<IndexInfo>>;

    /// Creates an index, returning its assigned name.
    async fn create_index(&self, collection: &str, spec: IndexSpec) -> EngineResult<String>;

    /// Drops an index by name.
    async fn drop_index(&self, collection: &str, name: &str) -> EngineResult<()>;
}
