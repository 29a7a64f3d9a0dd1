//! Orchestrator: drives a single migration's plan against a live
//! store end to end — validator suspension, op execution, validator/index
//! resync, and migration-lineage recording.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};

use docmigrate_core::error::EngineResult;
use docmigrate_store::DocumentStore;

use crate::migration::Migration;
use crate::real_applier::{apply, reverse, restore_validator, suspend_validator, sync_indexes};
use crate::registry::{discover_instances, record_migration, RecordedOperation};
use crate::schema::{CollectionSchema, SchemaAdapter, SchemaSet, UnionSchema};

/// Which side of a migration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Run the migration's `up` side.
    Up,
    /// Run the migration's `down` side.
    Down,
}

/// Resolves the schema set that should govern validator/index state after
/// the run completes: `up` targets the migration's own schemas; `down`
/// targets the parent's, or an empty set if this migration is the chain
/// root (reversing the root leaves nothing behind to resync).
fn target_schemas<'a>(migration: &'a Migration, direction: Direction, parent_schemas: Option<&'a SchemaSet>) -> Cow<'a, SchemaSet> {
    match direction {
        Direction::Up => Cow::Borrowed(&migration.schemas),
        Direction::Down => match parent_schemas {
            Some(schemas) => Cow::Borrowed(schemas),
            None => Cow::Owned(SchemaSet::default()),
        },
    }
}

/// Every physical collection name a schema set governs: plain collections
/// and multi-collections by their own name; multi-models are resolved to
/// their currently discovered instances by the caller, since a template
/// name is not itself a collection.
fn named_collections(schemas: &SchemaSet) -> BTreeSet<String> {
    schemas
        .collections
        .keys()
        .chain(schemas.multi_collections.keys())
        .cloned()
        .collect()
}

/// Runs `migration` against `store` in the given `direction`.
///
/// # Errors
///
/// Aborts on the first operation that fails and returns that error. Validators
/// disabled during the run are **not** re-enabled on failure: re-enabling
/// under partial state would reject legitimate documents written by the ops
/// that did complete. The caller's next successful run (typically a retried
/// `down`) is responsible for restoring them.
pub async fn apply_migration<S: DocumentStore + ?Sized>(
    store: &S,
    migration: &Migration,
    direction: Direction,
    parent_schemas: Option<&SchemaSet>,
    strict: bool,
    batch_size: Option<usize>,
) -> EngineResult<()> {
    let plan = migration.plan()?;
    let schemas = target_schemas(migration, direction, parent_schemas);

    let existing: HashSet<String> = store.list_collections(None).await?.into_iter().collect();
    for name in named_collections(&schemas) {
        if existing.contains(&name) {
            suspend_validator(store, &name).await?;
        }
    }
    for model_type in schemas.multi_models.keys() {
        for instance in discover_instances(store, model_type, &migration.id).await? {
            suspend_validator(store, &instance).await?;
        }
    }

    let ops = &plan.operations;
    match direction {
        Direction::Up => {
            for op in ops {
                apply(store, op, &migration.id, strict, batch_size).await?;
            }
        }
        Direction::Down => {
            for op in ops.iter().rev() {
                reverse(store, op, &migration.id, strict, batch_size).await?;
            }
        }
    }

    for (name, fields) in &schemas.collections {
        let adapter = CollectionSchema(fields.clone());
        restore_validator(store, name, adapter.emit_store_validator()).await?;
        sync_indexes(store, name, &adapter.extract_indexes()).await?;
    }
    for (name, type_map) in &schemas.multi_collections {
        let union = UnionSchema::from_type_map(type_map);
        restore_validator(store, name, union.emit_store_validator()).await?;
        sync_indexes(store, name, &union.extract_indexes()).await?;
    }

    let mut recorded: HashSet<(String, String)> = HashSet::new();
    let operation = match direction {
        Direction::Up => RecordedOperation::Applied,
        Direction::Down => RecordedOperation::Reverted,
    };

    for (model_type, type_map) in &schemas.multi_models {
        let union = UnionSchema::from_type_map(type_map);
        let instances = discover_instances(store, model_type, &migration.id).await?;
        for instance in instances {
            restore_validator(store, &instance, union.emit_store_validator()).await?;
            sync_indexes(store, &instance, &union.extract_indexes()).await?;
            if recorded.insert((instance.clone(), migration.id.clone())) {
                record_migration(store, &instance, &migration.id, operation).await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PlanBuilder;
    use crate::schema::{FieldMap, FieldSchema, FieldType};
    use docmigrate_store::{Filter, MemoryStore};
    use std::sync::Arc;

    fn users_schemas() -> SchemaSet {
        let mut schemas = SchemaSet::new();
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), FieldSchema::required(FieldType::String));
        schemas.collections.insert("users".to_string(), fields);
        schemas
    }

    #[tokio::test]
    async fn test_apply_migration_up_creates_and_seeds() {
        let store = MemoryStore::new();
        let schemas = users_schemas();
        let migration = Migration::new(
            "2025_01_01_0000_AAA@init",
            "init",
            None,
            schemas,
            Arc::new(|schemas| {
                let doc = serde_json::json!({"name": "Alice"}).as_object().unwrap().clone();
                Ok(PlanBuilder::new(schemas)
                    .create_collection("users")
                    .collection("users")
                    .seed(vec![doc])?
                    .compile())
            }),
        );

        apply_migration(&store, &migration, Direction::Up, None, true, None).await.unwrap();

        let all = store.find("users", &Filter::all(), 0, None).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_migration_down_reverses() {
        let store = MemoryStore::new();
        let schemas = users_schemas();
        let migration = Migration::new(
            "2025_01_01_0000_AAA@init",
            "init",
            None,
            schemas,
            Arc::new(|schemas| {
                let doc = serde_json::json!({"name": "Alice"}).as_object().unwrap().clone();
                Ok(PlanBuilder::new(schemas)
                    .create_collection("users")
                    .collection("users")
                    .seed(vec![doc])?
                    .compile())
            }),
        );

        apply_migration(&store, &migration, Direction::Up, None, true, None).await.unwrap();
        apply_migration(&store, &migration, Direction::Down, None, true, None).await.unwrap();

        let names = store.list_collections(Some("users")).await.unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn test_apply_migration_records_lineage_once_per_instance() {
        let store = MemoryStore::new();
        let mut schemas = SchemaSet::new();
        let mut fields = FieldMap::new();
        fields.insert("price".to_string(), FieldSchema::required(FieldType::Number));
        let mut type_map = std::collections::BTreeMap::new();
        type_map.insert("item".to_string(), fields);
        schemas.multi_models.insert("catalog".to_string(), type_map);

        let migration = Migration::new(
            "2025_01_01_0000_AAA@init",
            "init",
            None,
            schemas,
            Arc::new(|schemas| {
                Ok(PlanBuilder::new(schemas)
                    .new_multi_model_instance("catalog_a", "catalog")
                    .compile())
            }),
        );

        apply_migration(&store, &migration, Direction::Up, None, true, None).await.unwrap();

        let migrations_doc = store
            .find_one("catalog_a", &Filter::by_id(crate::schema::TYPE_MIGRATIONS))
            .await
            .unwrap()
            .unwrap();
        let applied = migrations_doc.get("appliedMigrations").and_then(|v| v.as_array()).unwrap();
        assert_eq!(applied.len(), 1);
    }
}
