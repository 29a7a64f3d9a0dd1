//! Real applier: drives a [`DocumentStore`] through the same operation
//! semantics the simulation applier models, with the additional
//! concerns a live store requires: validator suspension, index
//! synchronization, and batched I/O.

use docmigrate_core::error::{EngineError, EngineResult};
use docmigrate_store::{BulkWriteOp, DocumentStore, Filter, IndexSpec as StoreIndexSpec, ValidationLevel};

use crate::plan::Op;
use crate::registry::{create_info_documents, discover_instances};
use crate::schema::{CollectionSchema, IndexAnnotation, SchemaAdapter, TYPE_INFORMATION, TYPE_MIGRATIONS};

/// How many documents a single bulk-write batch carries. Mirrors
/// [`docmigrate_core::config::EngineConfig::batch_size`]; callers typically
/// source this from [`docmigrate_core::config::CONFIG`].
const DEFAULT_BATCH_SIZE: usize = 500;

fn batches<T>(items: Vec<T>, size: usize) -> impl Iterator<Item = Vec<T>> {
    let size = size.max(1);
    let mut items = items;
    std::iter::from_fn(move || {
        if items.is_empty() {
            None
        } else {
            let rest = items.split_off(items.len().min(size));
            Some(std::mem::replace(&mut items, rest))
        }
    })
}

/// Disables a collection's validator for the duration of a migration.
///
/// # Errors
///
/// Propagates the store's error if the `collMod`-equivalent call fails.
pub async fn suspend_validator<S: DocumentStore + ?Sized>(store: &S, collection: &str) -> EngineResult<()> {
    store.set_validator(collection, None, ValidationLevel::Off).await
}

/// Re-installs a collection's validator after a migration's operations complete.
///
/// # Errors
///
/// Propagates the store's error if the `collMod`-equivalent call fails.
pub async fn restore_validator<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    validator: serde_json::Value,
) -> EngineResult<()> {
    store.set_validator(collection, Some(validator), ValidationLevel::Strict).await
}

/// Synchronizes a collection's indexes to the set `annotations` declares:
/// creates missing indexes and drops indexes with no declared counterpart,
/// reusing an existing index (by name) when its options already match.
///
/// # Errors
///
/// Propagates the store's error if listing, creating, or dropping an index fails.
pub async fn sync_indexes<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    annotations: &[IndexAnnotation],
) -> EngineResult<()> {
    let existing = store.list_indexes(collection).await?;
    let namer = CollectionSchema(Default::default());

    let desired: Vec<StoreIndexSpec> = annotations
        .iter()
        .map(|a| StoreIndexSpec {
            name: Some(format!("{}_idx", namer.sanitize_path_name(&a.path))),
            key: vec![(a.path.clone(), 1)],
            unique: a.unique,
            sparse: false,
            collation: None,
            partial_filter_expression: None,
        })
        .collect();

    // Drop stale/changed indexes before creating desired ones: a changed
    // index can share its name with the desired replacement (e.g. flipping
    // `unique`), and creating first would collide with the still-present
    // old index and get swallowed as a benign race, leaving the collection
    // with neither the old nor the new index.
    for info in &existing {
        let still_wanted = desired.iter().any(|spec| spec.options_eq(&info.spec));
        if !still_wanted {
            if let Err(err) = store.drop_index(collection, &info.name).await {
                if EngineError::is_benign_store_race(&err.to_string()) {
                    tracing::warn!(%collection, name = %info.name, %err, "index drop raced with its own removal, ignoring");
                } else {
                    return Err(err);
                }
            }
        }
    }

    for spec in &desired {
        let reusable = existing.iter().any(|info| info.spec.options_eq(spec));
        if !reusable {
            if let Err(err) = store.create_index(collection, spec.clone()).await {
                if EngineError::is_benign_store_race(&err.to_string()) {
                    tracing::warn!(%collection, ?spec.name, %err, "index create raced with an existing index, ignoring");
                } else {
                    return Err(err);
                }
            }
        }
    }

    Ok(())
}

/// Applies `op` against a live store. Mirrors [`crate::simulate::apply`]'s
/// per-operation semantics, but performs batched I/O instead of building an
/// in-memory snapshot.
///
/// # Errors
///
/// Returns [`EngineError::Structural`] for precondition violations in
/// strict mode, [`EngineError::TransformFailed`] if a transform closure
/// errors on a document and strict mode is on, or propagates the
/// underlying store error.
pub async fn apply<S: DocumentStore + ?Sized>(
    store: &S,
    op: &Op,
    migration_id: &str,
    strict: bool,
    batch_size: Option<usize>,
) -> EngineResult<()> {
    let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE);

    match op {
        Op::CreateCollection { name, .. } | Op::CreateMultiCollection { name, .. } => {
            if strict && store.list_collections(Some(name)).await?.iter().any(|n| n == name) {
                return Err(EngineError::Structural(format!("collection '{name}' already exists")));
            }
            store.create_collection(name, None).await?;
        }
        Op::CreateMultiModelInstance { name, model_type, .. } => {
            if strict && store.list_collections(Some(name)).await?.iter().any(|n| n == name) {
                return Err(EngineError::Structural(format!("instance '{name}' already exists")));
            }
            store.create_collection(name, None).await?;
            let (information, migrations) = create_info_documents(model_type, migration_id);
            store.insert_many(name, vec![information, migrations]).await?;
        }
        Op::MarkAsMultiModel { name, model_type } => {
            if strict && store.find_one(name, &Filter::by_id(TYPE_INFORMATION)).await?.is_some() {
                return Err(EngineError::Structural(format!("'{name}' is already a multi-model instance")));
            }
            let (information, migrations) = create_info_documents(model_type, migration_id);
            store.insert_many(name, vec![information, migrations]).await?;
        }
        Op::SeedCollection { name, documents, .. }
        | Op::SeedMultiCollectionType { name, documents, .. }
        | Op::SeedMultiModelInstanceType { name, documents, .. } => {
            for batch in batches(documents.clone(), batch_size) {
                store.insert_many(name, batch).await?;
            }
        }
        Op::SeedMultiModelInstancesType { model_type, documents, .. } => {
            let instances = discover_instances(store, model_type, migration_id).await?;
            for instance in instances {
                for batch in batches(documents.clone(), batch_size) {
                    store.insert_many(&instance, batch).await?;
                }
            }
        }
        Op::TransformCollection { name, up, .. } => {
            transform_collection_documents(store, name, None, up, strict, batch_size).await?;
        }
        Op::TransformMultiCollectionType { name, type_name, up, .. } => {
            transform_collection_documents(store, name, Some(type_name), up, strict, batch_size).await?;
        }
        Op::TransformMultiModelInstanceType { name, type_name, up, .. } => {
            transform_collection_documents(store, name, Some(type_name), up, strict, batch_size).await?;
        }
        Op::TransformMultiModelInstancesType { model_type, type_name, up, .. } => {
            let instances = discover_instances(store, model_type, migration_id).await?;
            for instance in instances {
                transform_collection_documents(store, &instance, Some(type_name), up, strict, batch_size).await?;
            }
        }
        Op::UpdateIndexes { name, schema } => {
            let annotations = crate::schema::extract_indexes(schema);
            sync_indexes(store, name, &annotations).await?;
        }
    }

    Ok(())
}

/// Reverses `op` against a live store. Mirrors [`crate::simulate::reverse`]:
/// creates become drops, seeds become deletes-by-id, transforms run their
/// `down` closure, and `update_indexes` is a no-op (indexes are idempotent,
/// so there is nothing to undo).
///
/// # Errors
///
/// Returns [`EngineError::Reversibility`] immediately if `op` is irreversible,
/// or propagates the underlying store error otherwise.
pub async fn reverse<S: DocumentStore + ?Sized>(
    store: &S,
    op: &Op,
    migration_id: &str,
    strict: bool,
    batch_size: Option<usize>,
) -> EngineResult<()> {
    if op.is_irreversible() {
        return Err(EngineError::Reversibility(format!(
            "operation {op:?} is marked irreversible and cannot be reversed"
        )));
    }

    let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE);

    match op {
        Op::CreateCollection { name, .. }
        | Op::CreateMultiCollection { name, .. }
        | Op::CreateMultiModelInstance { name, .. } => {
            store.drop_collection(name).await?;
        }
        Op::MarkAsMultiModel { name, .. } => {
            let ids = vec![
                serde_json::Value::String(TYPE_INFORMATION.to_string()),
                serde_json::Value::String(TYPE_MIGRATIONS.to_string()),
            ];
            store.bulk_write(name, vec![BulkWriteOp::DeleteByIds { ids }]).await?;
        }
        Op::SeedCollection { name, documents, .. }
        | Op::SeedMultiCollectionType { name, documents, .. }
        | Op::SeedMultiModelInstanceType { name, documents, .. } => {
            delete_seeded(store, name, documents, batch_size).await?;
        }
        Op::SeedMultiModelInstancesType { model_type, documents, .. } => {
            let instances = discover_instances(store, model_type, migration_id).await?;
            for instance in instances {
                delete_seeded(store, &instance, documents, batch_size).await?;
            }
        }
        Op::TransformCollection { name, down, irreversible, .. } => {
            if *irreversible {
                return Err(EngineError::Reversibility(format!("transform on '{name}' is irreversible")));
            }
            transform_collection_documents(store, name, None, down, strict, batch_size).await?;
        }
        Op::TransformMultiCollectionType { name, type_name, down, irreversible, .. } => {
            if *irreversible {
                return Err(EngineError::Reversibility(format!("transform on '{name}:{type_name}' is irreversible")));
            }
            transform_collection_documents(store, name, Some(type_name), down, strict, batch_size).await?;
        }
        Op::TransformMultiModelInstanceType { name, type_name, down, irreversible, .. } => {
            if *irreversible {
                return Err(EngineError::Reversibility(format!("transform on '{name}:{type_name}' is irreversible")));
            }
            transform_collection_documents(store, name, Some(type_name), down, strict, batch_size).await?;
        }
        Op::TransformMultiModelInstancesType { model_type, type_name, down, irreversible, .. } => {
            if *irreversible {
                return Err(EngineError::Reversibility(format!(
                    "transform on '{model_type}:{type_name}' is irreversible"
                )));
            }
            let instances = discover_instances(store, model_type, migration_id).await?;
            for instance in instances {
                transform_collection_documents(store, &instance, Some(type_name), down, strict, batch_size).await?;
            }
        }
        Op::UpdateIndexes { .. } => {}
    }

    Ok(())
}

async fn delete_seeded<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    documents: &[docmigrate_store::Document],
    batch_size: usize,
) -> EngineResult<()> {
    let ids: Vec<serde_json::Value> = documents.iter().filter_map(|d| d.get("_id").cloned()).collect();
    for batch in batches(ids, batch_size) {
        if batch.is_empty() {
            continue;
        }
        store.bulk_write(collection, vec![BulkWriteOp::DeleteByIds { ids: batch }]).await?;
    }
    Ok(())
}

async fn transform_collection_documents<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    type_name: Option<&str>,
    up: &crate::plan::Transform,
    strict: bool,
    batch_size: usize,
) -> EngineResult<()> {
    let filter = match type_name {
        Some(t) => {
            let mut map = std::collections::BTreeMap::new();
            map.insert("_type".to_string(), t.into());
            docmigrate_store::Filter(map)
        }
        None => Filter::all(),
    };
    let documents = store.find(collection, &filter, 0, None).await?;

    let mut replace_ops = Vec::with_capacity(documents.len());
    for doc in documents {
        match up(&doc) {
            Ok(transformed) => {
                if let Some(id) = doc.get("_id").cloned() {
                    replace_ops.push(BulkWriteOp::ReplaceById { id, replacement: transformed });
                }
            }
            Err(message) => {
                if strict {
                    return Err(EngineError::TransformFailed(message));
                }
                tracing::warn!(document = ?doc.get("_id"), %message, "skipping document that failed transform");
            }
        }
    }

    for batch in batches(replace_ops, batch_size) {
        store.bulk_write(collection, batch).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmigrate_store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_collection_then_duplicate_errors_in_strict_mode() {
        let store = MemoryStore::new();
        apply(&store, &Op::CreateCollection { name: "users".to_string(), schema: None }, "m1", true, None)
            .await
            .unwrap();
        let result = apply(
            &store,
            &Op::CreateCollection { name: "users".to_string(), schema: None },
            "m1",
            true,
            None,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_seed_then_transform_round_trip() {
        let store = MemoryStore::new();
        apply(&store, &Op::CreateCollection { name: "users".to_string(), schema: None }, "m1", true, None)
            .await
            .unwrap();
        apply(
            &store,
            &Op::SeedCollection {
                name: "users".to_string(),
                schema: Default::default(),
                documents: vec![
                    json!({"_id": "1", "name": "Alice"}).as_object().unwrap().clone(),
                    json!({"_id": "2", "name": "Bob"}).as_object().unwrap().clone(),
                ],
            },
            "m1",
            true,
            None,
        )
        .await
        .unwrap();

        let up: crate::plan::Transform = Arc::new(|d| {
            let mut d = d.clone();
            d.insert("greeted".to_string(), json!(true));
            Ok(d)
        });
        let down: crate::plan::Transform = Arc::new(|d| Ok(d.clone()));
        apply(
            &store,
            &Op::TransformCollection { name: "users".to_string(), up, down, irreversible: false },
            "m1",
            true,
            None,
        )
        .await
        .unwrap();

        let all = store.find("users", &Filter::all(), 0, None).await.unwrap();
        assert!(all.iter().all(|d| d.get("greeted").and_then(|v| v.as_bool()) == Some(true)));
    }

    #[tokio::test]
    async fn test_create_multimodel_instance_installs_metadata() {
        let store = MemoryStore::new();
        apply(
            &store,
            &Op::CreateMultiModelInstance {
                name: "catalog_a".to_string(),
                model_type: "catalog".to_string(),
                type_map: Default::default(),
            },
            "2025_01_01_0000_AAA@init",
            true,
            None,
        )
        .await
        .unwrap();

        let info = store.find_one("catalog_a", &Filter::by_id(TYPE_INFORMATION)).await.unwrap();
        assert!(info.is_some());
        let migrations = store.find_one("catalog_a", &Filter::by_id(TYPE_MIGRATIONS)).await.unwrap();
        assert!(migrations.is_some());
    }

    #[tokio::test]
    async fn test_batches_splits_documents() {
        let items: Vec<i32> = (0..10).collect();
        let chunks: Vec<_> = batches(items, 3).collect();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].len(), 3);
        assert_eq!(chunks[3].len(), 1);
    }

    #[tokio::test]
    async fn test_sync_indexes_creates_and_drops() {
        let store = MemoryStore::new();
        store.create_collection("users", None).await.unwrap();
        store
            .create_index(
                "users",
                StoreIndexSpec {
                    name: None,
                    key: vec![("stale".to_string(), 1)],
                    unique: false,
                    sparse: false,
                    collation: None,
                    partial_filter_expression: None,
                },
            )
            .await
            .unwrap();

        sync_indexes(
            &store,
            "users",
            &[IndexAnnotation { path: "email".to_string(), unique: true }],
        )
        .await
        .unwrap();

        let indexes = store.list_indexes("users").await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].spec.key, vec![("email".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_sync_indexes_recreates_same_named_index_on_option_change() {
        let store = MemoryStore::new();
        store.create_collection("users", None).await.unwrap();
        store
            .create_index(
                "users",
                StoreIndexSpec {
                    name: Some("email_idx".to_string()),
                    key: vec![("email".to_string(), 1)],
                    unique: true,
                    sparse: false,
                    collation: None,
                    partial_filter_expression: None,
                },
            )
            .await
            .unwrap();

        sync_indexes(
            &store,
            "users",
            &[IndexAnnotation { path: "email".to_string(), unique: false }],
        )
        .await
        .unwrap();

        let indexes = store.list_indexes("users").await.unwrap();
        assert_eq!(indexes.len(), 1, "the unique index must be dropped and a non-unique one recreated, not left absent");
        assert_eq!(indexes[0].name, "email_idx");
        assert!(!indexes[0].spec.unique);
    }
}
