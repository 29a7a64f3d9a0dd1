//! Multi-instance registry: discovery of a multi-model's physical
//! instances, idempotent per-call recording of applied migrations, and the
//! version guard that decides which instances a migration reaches.

use std::collections::BTreeSet;

use docmigrate_core::error::{EngineError, EngineResult};
use docmigrate_store::{Document, DocumentStore, Filter};

use crate::ids::should_instance_receive_migration;
use crate::schema::{TYPE_INFORMATION, TYPE_MIGRATIONS};
use crate::simulate::SimulatedDatabase;

/// Discovers, within a [`SimulatedDatabase`], every instance whose
/// `_information.collectionType` equals `model_type`, admitted by the
/// version guard against `migration_id`. Instances are returned sorted by
/// name for deterministic fan-out order.
///
/// Instances live in `multi_models`; `collections` is also scanned, since
/// `mark_as_multimodel` is applied within the same `apply` call that may be
/// reading this state mid-transaction.
pub fn discover_instances_in(
    state: &SimulatedDatabase,
    model_type: &str,
    migration_id: &str,
) -> Vec<String> {
    let mut found = BTreeSet::new();
    for (name, content) in state.multi_models.iter().chain(state.collections.iter()) {
        if let Some(info) = content
            .iter()
            .find(|d| d.get("_id").and_then(|v| v.as_str()) == Some(TYPE_INFORMATION))
        {
            if info.get("collectionType").and_then(|v| v.as_str()) != Some(model_type) {
                continue;
            }
            let from = content
                .iter()
                .find(|d| d.get("_id").and_then(|v| v.as_str()) == Some(TYPE_MIGRATIONS))
                .and_then(|d| d.get("fromMigrationId"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            if should_instance_receive_migration(from, migration_id) {
                found.insert(name.clone());
            }
        }
    }
    found.into_iter().collect()
}

/// Discovers instances of `model_type` against a real [`DocumentStore`],
/// admitted by the version guard.
///
/// # Errors
///
/// Propagates any [`DocumentStore`] error encountered while listing
/// collections or reading metadata documents.
pub async fn discover_instances<S: DocumentStore + ?Sized>(
    store: &S,
    model_type: &str,
    migration_id: &str,
) -> EngineResult<Vec<String>> {
    let mut found = Vec::new();
    let names = store.list_collections(None).await?;
    for name in names {
        let info = store.find_one(&name, &Filter::by_id(TYPE_INFORMATION)).await?;
        let Some(info) = info else { continue };
        if info.get("collectionType").and_then(|v| v.as_str()) != Some(model_type) {
            continue;
        }
        let migrations = store.find_one(&name, &Filter::by_id(TYPE_MIGRATIONS)).await?;
        let from = migrations
            .as_ref()
            .and_then(|d| d.get("fromMigrationId"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        if should_instance_receive_migration(from, migration_id) {
            found.push(name);
        }
    }
    found.sort();
    Ok(found)
}

/// The direction a migration was recorded in, stamped onto its
/// `appliedMigrations` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedOperation {
    /// The migration's `up` side ran.
    Applied,
    /// The migration's `down` side ran.
    Reverted,
}

impl RecordedOperation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Reverted => "reverted",
        }
    }
}

fn entry_id(entry: &serde_json::Value) -> Option<&str> {
    entry.get("id").and_then(serde_json::Value::as_str)
}

/// Records that `migration_id` has been applied (or reverted) against the
/// instance named `instance`, idempotently: if an entry for this ID and
/// `operation` is already present in `appliedMigrations`, this is a no-op.
/// Also advances `fromMigrationId`.
///
/// Each entry in `appliedMigrations` is `{id, appliedAt, operation}`, where
/// `appliedAt` is stamped as `migration_id` itself (the engine has no wall
/// clock of its own; callers with one may overwrite it post hoc).
///
/// # Errors
///
/// Returns [`EngineError::Structural`] if the instance has no `_migrations`
/// document, or propagates the underlying store error.
pub async fn record_migration<S: DocumentStore + ?Sized>(
    store: &S,
    instance: &str,
    migration_id: &str,
    operation: RecordedOperation,
) -> EngineResult<()> {
    let current = store
        .find_one(instance, &Filter::by_id(TYPE_MIGRATIONS))
        .await?
        .ok_or_else(|| EngineError::Structural(format!("instance '{instance}' has no _migrations document")))?;

    let already_recorded = current.get("appliedMigrations").and_then(|v| v.as_array()).is_some_and(|applied| {
        applied.iter().any(|entry| {
            entry_id(entry) == Some(migration_id)
                && entry.get("operation").and_then(serde_json::Value::as_str) == Some(operation.as_str())
        })
    });
    if already_recorded {
        return Ok(());
    }

    let mut replacement: Document = current;
    let mut applied = replacement
        .get("appliedMigrations")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    applied.push(serde_json::json!({
        "id": migration_id,
        "appliedAt": migration_id,
        "mongodbeeVersion": env!("CARGO_PKG_VERSION"),
        "operation": operation.as_str(),
    }));
    replacement.insert("appliedMigrations".to_string(), serde_json::Value::Array(applied));
    replacement.insert(
        "fromMigrationId".to_string(),
        serde_json::Value::String(migration_id.to_string()),
    );

    store
        .update_one(instance, &Filter::by_id(TYPE_MIGRATIONS), replacement)
        .await?;
    Ok(())
}

/// Builds the create-info pair of metadata documents (`_information`,
/// `_migrations`) for a brand-new instance.
pub fn create_info_documents(model_type: &str, migration_id: &str) -> (Document, Document) {
    let information = serde_json::json!({
        "_id": TYPE_INFORMATION,
        "_type": TYPE_INFORMATION,
        "collectionType": model_type,
        "createdAt": migration_id,
    })
    .as_object()
    .unwrap()
    .clone();
    let migrations = serde_json::json!({
        "_id": TYPE_MIGRATIONS,
        "_type": TYPE_MIGRATIONS,
        "fromMigrationId": migration_id,
        "appliedMigrations": [],
    })
    .as_object()
    .unwrap()
    .clone();
    (information, migrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmigrate_store::MemoryStore;
    use serde_json::json;

    fn instance_doc(model_type: &str, from: &str, applied: Vec<&str>) -> Vec<Document> {
        vec![
            json!({"_id": TYPE_INFORMATION, "collectionType": model_type}).as_object().unwrap().clone(),
            json!({
                "_id": TYPE_MIGRATIONS,
                "fromMigrationId": from,
                "appliedMigrations": applied,
            })
            .as_object()
            .unwrap()
            .clone(),
        ]
    }

    #[test]
    fn test_discover_instances_in_filters_by_model_type_and_guard() {
        let mut state = SimulatedDatabase::new(false);
        state.multi_models.insert(
            "catalog_a".to_string(),
            instance_doc("catalog", "2025_01_01_0000_AAA@init", vec![]),
        );
        state.multi_models.insert(
            "catalog_b".to_string(),
            instance_doc("catalog", "2025_12_31_0000_ZZZ@future", vec![]),
        );
        state.multi_models.insert(
            "orders_a".to_string(),
            instance_doc("orders", "2025_01_01_0000_AAA@init", vec![]),
        );

        let found = discover_instances_in(&state, "catalog", "2025_06_01_0000_MMM@mid");
        assert_eq!(found, vec!["catalog_a".to_string()]);
    }

    #[tokio::test]
    async fn test_discover_instances_against_store() {
        let store = MemoryStore::new();
        store.create_collection("catalog_a", None).await.unwrap();
        store
            .insert_one(
                "catalog_a",
                json!({"_id": TYPE_INFORMATION, "collectionType": "catalog"}).as_object().unwrap().clone(),
            )
            .await
            .unwrap();
        store
            .insert_one(
                "catalog_a",
                json!({"_id": TYPE_MIGRATIONS, "fromMigrationId": "unknown", "appliedMigrations": []})
                    .as_object()
                    .unwrap()
                    .clone(),
            )
            .await
            .unwrap();

        let found = discover_instances(&store, "catalog", "2025_06_01_0000_MMM@mid").await.unwrap();
        assert_eq!(found, vec!["catalog_a".to_string()]);
    }

    #[tokio::test]
    async fn test_record_migration_is_idempotent() {
        let store = MemoryStore::new();
        store.create_collection("catalog_a", None).await.unwrap();
        store
            .insert_one(
                "catalog_a",
                json!({"_id": TYPE_MIGRATIONS, "fromMigrationId": "unknown", "appliedMigrations": []})
                    .as_object()
                    .unwrap()
                    .clone(),
            )
            .await
            .unwrap();

        record_migration(&store, "catalog_a", "2025_06_01_0000_MMM@mid", RecordedOperation::Applied)
            .await
            .unwrap();
        record_migration(&store, "catalog_a", "2025_06_01_0000_MMM@mid", RecordedOperation::Applied)
            .await
            .unwrap();

        let doc = store
            .find_one("catalog_a", &Filter::by_id(TYPE_MIGRATIONS))
            .await
            .unwrap()
            .unwrap();
        let applied = doc.get("appliedMigrations").and_then(|v| v.as_array()).unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(entry_id(&applied[0]), Some("2025_06_01_0000_MMM@mid"));
        assert_eq!(doc.get("fromMigrationId").and_then(|v| v.as_str()), Some("2025_06_01_0000_MMM@mid"));
    }
}
