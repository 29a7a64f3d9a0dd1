//! Simulation applier: a pure function from (DB-state, operation) to
//! DB-state, and its reverse. Drives the validator and stands in for a
//! real store during tests.
//!
//! All mutation produces a fresh [`SimulatedDatabase`] (copy-on-write); the
//! reversibility test compares snapshots by structural equality, which
//! would false-positive under in-place mutation.

use std::collections::BTreeMap;

use docmigrate_core::error::{EngineError, EngineResult};
use ulid::Ulid;

use crate::plan::Op;
use crate::registry::discover_instances_in;
use crate::schema::{Document, TYPE_INFORMATION, TYPE_MIGRATIONS};

/// A single recorded apply/reverse event, kept when history tracking is enabled.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// A label identifying which operation ran (its [`Op`] debug label).
    pub op_type: String,
    /// Whether this entry was a forward apply or a reverse.
    pub operation: Direction,
}

/// The direction an operation is run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Forward (`up`) execution.
    Apply,
    /// Backward (`down`) execution.
    Reverse,
}

/// An immutable snapshot of simulated database state.
///
/// `collections` holds plain collections and multi-collections;
/// `multi_models` holds multi-model instances (physical collections
/// carrying an `_information` document). `mark_as_multimodel` moves a name
/// from `collections` into `multi_models` in place, since that operation's
/// entire purpose is to reclassify an existing collection as an instance.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDatabase {
    /// Plain collections and multi-collections, keyed by name.
    pub collections: BTreeMap<String, Vec<Document>>,
    /// Multi-model instances, keyed by instance (collection) name.
    pub multi_models: BTreeMap<String, Vec<Document>>,
    /// Recorded apply/reverse events, present only when history tracking is on.
    pub operation_history: Option<Vec<HistoryEntry>>,
}

impl SimulatedDatabase {
    /// Creates an empty database, with history tracking enabled or disabled.
    pub fn new(track_history: bool) -> Self {
        Self {
            collections: BTreeMap::new(),
            multi_models: BTreeMap::new(),
            operation_history: if track_history { Some(Vec::new()) } else { None },
        }
    }

    fn record(&mut self, op: &Op, direction: Direction) {
        if let Some(history) = &mut self.operation_history {
            history.push(HistoryEntry {
                op_type: format!("{op:?}"),
                operation: direction,
            });
        }
    }

    fn collection_exists(&self, name: &str) -> bool {
        self.collections.contains_key(name) || self.multi_models.contains_key(name)
    }
}

/// Parameters that are not part of the op itself but are needed to apply it
/// (the current migration's identity, and the applier's strictness).
#[derive(Debug, Clone)]
pub struct ApplyContext<'a> {
    /// The ID of the migration currently being applied, stamped onto
    /// freshly-created multi-model instances' `_information` document.
    pub migration_id: &'a str,
    /// Whether preconditions are enforced (`true`) or auto-healed (`false`).
    pub strict: bool,
}

fn fresh_id(type_name: Option<&str>) -> String {
    let ulid = Ulid::new().to_string().to_lowercase();
    match type_name {
        Some(t) => format!("{t}:{ulid}"),
        None => ulid,
    }
}

fn stamp_type(mut doc: Document, type_name: &str) -> Document {
    doc.entry("_type".to_string())
        .or_insert_with(|| type_name.into());
    doc
}

fn ensure_id(mut doc: Document, type_name: Option<&str>) -> Document {
    if !doc.contains_key("_id") {
        doc.insert("_id".to_string(), fresh_id(type_name).into());
    }
    doc
}

fn information_doc(model_type: &str, migration_id: &str) -> Document {
    serde_json::json!({
        "_id": TYPE_INFORMATION,
        "_type": TYPE_INFORMATION,
        "collectionType": model_type,
        "createdAt": migration_id,
    })
    .as_object()
    .unwrap()
    .clone()
}

fn migrations_doc(migration_id: &str) -> Document {
    serde_json::json!({
        "_id": TYPE_MIGRATIONS,
        "_type": TYPE_MIGRATIONS,
        "fromMigrationId": migration_id,
        "appliedMigrations": [],
    })
    .as_object()
    .unwrap()
    .clone()
}

fn apply_transform(
    content: &[Document],
    type_name: Option<&str>,
    up: &crate::plan::Transform,
    strict: bool,
) -> EngineResult<Vec<Document>> {
    let mut out = Vec::with_capacity(content.len());
    for doc in content {
        if let Some(t) = type_name {
            if doc.get("_type").and_then(|v| v.as_str()) != Some(t) {
                out.push(doc.clone());
                continue;
            }
        }
        match up(doc) {
            Ok(transformed) => out.push(transformed),
            Err(message) => {
                if strict {
                    return Err(EngineError::TransformFailed(message));
                }
                tracing::warn!(document = ?doc.get("_id"), %message, "skipping document that failed transform");
                out.push(doc.clone());
            }
        }
    }
    Ok(out)
}

/// Applies `op` to `state`, producing a fresh state. Never mutates `state`.
///
/// # Errors
///
/// In strict mode, returns [`EngineError::Structural`] for precondition
/// violations (e.g. creating a collection that already exists) and
/// [`EngineError::TransformFailed`] if a transform closure errors.
pub fn apply(state: &SimulatedDatabase, op: &Op, ctx: &ApplyContext<'_>) -> EngineResult<SimulatedDatabase> {
    let mut next = state.clone();

    match op {
        Op::CreateCollection { name, .. } => {
            if ctx.strict && next.collection_exists(name) {
                return Err(EngineError::Structural(format!("collection '{name}' already exists")));
            }
            next.collections.entry(name.clone()).or_default();
        }
        Op::CreateMultiCollection { name, .. } => {
            if ctx.strict && next.collection_exists(name) {
                return Err(EngineError::Structural(format!("collection '{name}' already exists")));
            }
            next.collections.entry(name.clone()).or_default();
        }
        Op::CreateMultiModelInstance { name, model_type, .. } => {
            if ctx.strict && next.collection_exists(name) {
                return Err(EngineError::Structural(format!("instance '{name}' already exists")));
            }
            next.multi_models.insert(
                name.clone(),
                vec![
                    information_doc(model_type, ctx.migration_id),
                    migrations_doc(ctx.migration_id),
                ],
            );
        }
        Op::MarkAsMultiModel { name, model_type } => {
            let mut content = next.collections.remove(name).unwrap_or_default();
            if ctx.strict && content.iter().any(|d| d.get("_id").and_then(|v| v.as_str()) == Some(TYPE_INFORMATION)) {
                return Err(EngineError::Structural(format!(
                    "'{name}' is already a multi-model instance"
                )));
            }
            content.push(information_doc(model_type, ctx.migration_id));
            content.push(migrations_doc(ctx.migration_id));
            next.multi_models.insert(name.clone(), content);
        }
        Op::SeedCollection { name, documents, .. } => {
            let target = next.collections.entry(name.clone()).or_default();
            for doc in documents {
                target.push(ensure_id(doc.clone(), None));
            }
        }
        Op::SeedMultiCollectionType { name, type_name, documents, .. } => {
            let target = next.collections.entry(name.clone()).or_default();
            for doc in documents {
                let doc = stamp_type(doc.clone(), type_name);
                target.push(ensure_id(doc, Some(type_name)));
            }
        }
        Op::SeedMultiModelInstanceType { name, type_name, documents, .. } => {
            let target = next.multi_models.entry(name.clone()).or_default();
            for doc in documents {
                let doc = stamp_type(doc.clone(), type_name);
                target.push(ensure_id(doc, Some(type_name)));
            }
        }
        Op::SeedMultiModelInstancesType { model_type, type_name, documents, .. } => {
            let instances = discover_instances_in(&next, model_type, ctx.migration_id);
            for instance in instances {
                let target = next.multi_models.entry(instance).or_default();
                for doc in documents {
                    let doc = stamp_type(doc.clone(), type_name);
                    target.push(ensure_id(doc, Some(type_name)));
                }
            }
        }
        Op::TransformCollection { name, up, .. } => {
            if let Some(content) = next.collections.get(name) {
                let transformed = apply_transform(content, None, up, ctx.strict)?;
                next.collections.insert(name.clone(), transformed);
            } else if ctx.strict {
                return Err(EngineError::Structural(format!("collection '{name}' not found")));
            }
        }
        Op::TransformMultiCollectionType { name, type_name, up, .. } => {
            if let Some(content) = next.collections.get(name) {
                let transformed = apply_transform(content, Some(type_name), up, ctx.strict)?;
                next.collections.insert(name.clone(), transformed);
            } else if ctx.strict {
                return Err(EngineError::Structural(format!("collection '{name}' not found")));
            }
        }
        Op::TransformMultiModelInstanceType { name, type_name, up, .. } => {
            if let Some(content) = next.multi_models.get(name) {
                let transformed = apply_transform(content, Some(type_name), up, ctx.strict)?;
                next.multi_models.insert(name.clone(), transformed);
            } else if ctx.strict {
                return Err(EngineError::Structural(format!("instance '{name}' not found")));
            }
        }
        Op::TransformMultiModelInstancesType { model_type, type_name, up, .. } => {
            let instances = discover_instances_in(&next, model_type, ctx.migration_id);
            for instance in instances {
                let content = next.multi_models.get(&instance).cloned().unwrap_or_default();
                let transformed = apply_transform(&content, Some(type_name), up, ctx.strict)?;
                next.multi_models.insert(instance, transformed);
            }
        }
        Op::UpdateIndexes { .. } => {
            // No-op in simulation: indexes are not materialized here.
        }
    }

    next.record(op, Direction::Apply);
    Ok(next)
}

/// Reverses `op` against `state`, producing a fresh state. Never mutates `state`.
///
/// # Errors
///
/// Returns [`EngineError::Reversibility`] if `op` is individually marked
/// irreversible. Otherwise behaves symmetrically to [`apply`].
pub fn reverse(state: &SimulatedDatabase, op: &Op, ctx: &ApplyContext<'_>) -> EngineResult<SimulatedDatabase> {
    if op.is_irreversible() {
        return Err(EngineError::Reversibility(format!(
            "operation {op:?} is marked irreversible"
        )));
    }

    let mut next = state.clone();

    match op {
        Op::CreateCollection { name, .. } | Op::CreateMultiCollection { name, .. } => {
            next.collections.remove(name);
        }
        Op::CreateMultiModelInstance { name, .. } => {
            next.multi_models.remove(name);
        }
        Op::MarkAsMultiModel { name, .. } => {
            if let Some(mut content) = next.multi_models.remove(name) {
                content.retain(|d| {
                    !matches!(
                        d.get("_id").and_then(|v| v.as_str()),
                        Some(TYPE_INFORMATION) | Some(TYPE_MIGRATIONS)
                    )
                });
                next.collections.insert(name.clone(), content);
            }
        }
        Op::SeedCollection { name, documents, .. } => {
            remove_seeded(next.collections.get_mut(name), documents);
        }
        Op::SeedMultiCollectionType { name, documents, .. } => {
            remove_seeded(next.collections.get_mut(name), documents);
        }
        Op::SeedMultiModelInstanceType { name, documents, .. } => {
            remove_seeded(next.multi_models.get_mut(name), documents);
        }
        Op::SeedMultiModelInstancesType { model_type, documents, .. } => {
            let instances = discover_instances_in(&next, model_type, ctx.migration_id);
            for instance in instances {
                remove_seeded(next.multi_models.get_mut(&instance), documents);
            }
        }
        Op::TransformCollection { name, down, .. } => {
            if let Some(content) = next.collections.get(name) {
                let transformed = apply_transform(content, None, down, ctx.strict)?;
                next.collections.insert(name.clone(), transformed);
            }
        }
        Op::TransformMultiCollectionType { name, type_name, down, .. } => {
            if let Some(content) = next.collections.get(name) {
                let transformed = apply_transform(content, Some(type_name), down, ctx.strict)?;
                next.collections.insert(name.clone(), transformed);
            }
        }
        Op::TransformMultiModelInstanceType { name, type_name, down, .. } => {
            if let Some(content) = next.multi_models.get(name) {
                let transformed = apply_transform(content, Some(type_name), down, ctx.strict)?;
                next.multi_models.insert(name.clone(), transformed);
            }
        }
        Op::TransformMultiModelInstancesType { model_type, type_name, down, .. } => {
            let instances = discover_instances_in(&next, model_type, ctx.migration_id);
            for instance in instances {
                let content = next.multi_models.get(&instance).cloned().unwrap_or_default();
                let transformed = apply_transform(&content, Some(type_name), down, ctx.strict)?;
                next.multi_models.insert(instance, transformed);
            }
        }
        Op::UpdateIndexes { .. } => {}
    }

    next.record(op, Direction::Reverse);
    Ok(next)
}

fn remove_seeded(content: Option<&mut Vec<Document>>, seeded: &[Document]) {
    let Some(content) = content else { return };
    let seeded_ids: Vec<_> = seeded.iter().filter_map(|d| d.get("_id").cloned()).collect();
    content.retain(|d| !d.get("_id").is_some_and(|id| seeded_ids.contains(id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx(migration_id: &str) -> ApplyContext<'_> {
        ApplyContext { migration_id, strict: true }
    }

    fn doc(id: &str, name: &str) -> Document {
        json!({"_id": id, "name": name}).as_object().unwrap().clone()
    }

    #[test]
    fn test_s1_create_and_seed_reversibility() {
        let state = SimulatedDatabase::new(false);
        let create = Op::CreateCollection { name: "users".to_string(), schema: None };
        let seed = Op::SeedCollection {
            name: "users".to_string(),
            schema: Default::default(),
            documents: vec![doc("1", "Alice"), doc("2", "Bob")],
        };
        let c = ctx("2025_01_01_0000_AAA@init");

        let after_create = apply(&state, &create, &c).unwrap();
        let after_seed = apply(&after_create, &seed, &c).unwrap();
        assert_eq!(after_seed.collections["users"].len(), 2);

        let reversed_seed = reverse(&after_seed, &seed, &c).unwrap();
        assert!(reversed_seed.collections["users"].is_empty());
        let reversed_create = reverse(&reversed_seed, &create, &c).unwrap();
        assert!(!reversed_create.collections.contains_key("users"));
    }

    #[test]
    fn test_s2_transform_reversibility() {
        let mut state = SimulatedDatabase::new(false);
        state.collections.insert("users".to_string(), vec![doc("1", "Alice"), doc("2", "Bob")]);
        let original = state.clone();

        let up: crate::plan::Transform = Arc::new(|d| {
            let mut d = d.clone();
            d.insert("age".to_string(), json!(25));
            Ok(d)
        });
        let down: crate::plan::Transform = Arc::new(|d| {
            let mut d = d.clone();
            d.remove("age");
            Ok(d)
        });
        let op = Op::TransformCollection {
            name: "users".to_string(),
            up,
            down,
            irreversible: false,
        };
        let c = ctx("2025_01_01_0000_AAA@init");

        let forward = apply(&state, &op, &c).unwrap();
        assert!(forward.collections["users"].iter().all(|d| d.get("age").is_some()));

        let back = reverse(&forward, &op, &c).unwrap();
        assert_eq!(back.collections["users"], original.collections["users"]);
    }

    #[test]
    fn test_apply_never_mutates_input() {
        let state = SimulatedDatabase::new(false);
        let op = Op::CreateCollection { name: "users".to_string(), schema: None };
        let c = ctx("2025_01_01_0000_AAA@init");
        let _ = apply(&state, &op, &c).unwrap();
        assert!(state.collections.is_empty());
    }

    #[test]
    fn test_strict_create_duplicate_errors() {
        let mut state = SimulatedDatabase::new(false);
        state.collections.insert("users".to_string(), Vec::new());
        let op = Op::CreateCollection { name: "users".to_string(), schema: None };
        let c = ctx("2025_01_01_0000_AAA@init");
        assert!(apply(&state, &op, &c).is_err());
    }

    #[test]
    fn test_non_strict_create_duplicate_ok() {
        let mut state = SimulatedDatabase::new(false);
        state.collections.insert("users".to_string(), Vec::new());
        let op = Op::CreateCollection { name: "users".to_string(), schema: None };
        let c = ApplyContext { migration_id: "2025_01_01_0000_AAA@init", strict: false };
        assert!(apply(&state, &op, &c).is_ok());
    }

    #[test]
    fn test_irreversible_transform_refuses_reverse() {
        let mut state = SimulatedDatabase::new(false);
        state.collections.insert("users".to_string(), vec![doc("1", "Alice")]);
        let op = Op::TransformCollection {
            name: "users".to_string(),
            up: Arc::new(|d| Ok(d.clone())),
            down: Arc::new(|d| Ok(d.clone())),
            irreversible: true,
        };
        let c = ctx("2025_01_01_0000_AAA@init");
        let forward = apply(&state, &op, &c).unwrap();
        assert!(reverse(&forward, &op, &c).is_err());
    }

    #[test]
    fn test_mark_as_multimodel_inserts_metadata_and_reverse_strips_it() {
        let mut state = SimulatedDatabase::new(false);
        state.collections.insert("legacy".to_string(), vec![doc("1", "Alice")]);
        let op = Op::MarkAsMultiModel { name: "legacy".to_string(), model_type: "catalog".to_string() };
        let c = ctx("2025_01_01_0000_AAA@init");

        let marked = apply(&state, &op, &c).unwrap();
        assert!(!marked.collections.contains_key("legacy"));
        let content = &marked.multi_models["legacy"];
        assert_eq!(content.len(), 3);

        let reversed = reverse(&marked, &op, &c).unwrap();
        assert_eq!(reversed.collections["legacy"].len(), 1);
        assert!(!reversed.multi_models.contains_key("legacy"));
    }

    #[test]
    fn test_history_tracking() {
        let mut state = SimulatedDatabase::new(true);
        let op = Op::CreateCollection { name: "users".to_string(), schema: None };
        let c = ctx("2025_01_01_0000_AAA@init");
        state = apply(&state, &op, &c).unwrap();
        assert_eq!(state.operation_history.unwrap().len(), 1);
    }

    #[test]
    fn test_update_indexes_is_noop() {
        let state = SimulatedDatabase::new(false);
        let op = Op::UpdateIndexes { name: "users".to_string(), schema: Default::default() };
        let c = ctx("2025_01_01_0000_AAA@init");
        let after = apply(&state, &op, &c).unwrap();
        assert!(after.collections.is_empty());
        let back = reverse(&after, &op, &c).unwrap();
        assert!(back.collections.is_empty());
    }
}
