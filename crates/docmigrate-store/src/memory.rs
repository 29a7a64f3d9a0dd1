//! An in-process [`DocumentStore`] implementation backed by a `Mutex`-guarded
//! map of vectors. Used by the engine's own test suite and by demos; real
//! deployments plug in a driver for their document database.

use std::collections::HashMap;
use std::sync::Mutex;

use docmigrate_core::error::{EngineError, EngineResult};
use serde_json::Value;

use crate::document_store::{
    BulkWriteOp, Document, DocumentStore, Filter, IndexInfo, IndexSpec, ValidationLevel,
    ValidatorSpec,
};

struct CollectionState {
    documents: Vec<Document>,
    validator: Option<ValidatorSpec>,
    validation_level: ValidationLevel,
    indexes: Vec<IndexInfo>,
}

impl CollectionState {
    fn new() -> Self {
        Self {
            documents: Vec::new(),
            validator: None,
            validation_level: ValidationLevel::Off,
            indexes: Vec::new(),
        }
    }
}

/// An in-memory [`DocumentStore`], useful for tests and local experimentation.
///
/// Validator enforcement is intentionally not implemented here: this store
/// exists to exercise the engine's batching, index-synchronization, and
/// fan-out logic, not to reimplement a real validator engine. Callers that
/// need schema enforcement get it from the simulation applier
/// upstream of this store.
pub struct MemoryStore {
    collections: Mutex<HashMap<String, CollectionState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
        }
    }
}

fn doc_id(doc: &Document) -> Option<Value> {
    doc.get("_id").cloned()
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collections(&self, name_filter: Option<&str>) -> EngineResult<Vec<String>> {
        let guard = self.collections.lock().unwrap();
        let mut names: Vec<String> = guard
            .keys()
            .filter(|name| name_filter.is_none_or(|f| name.contains(f)))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(
        &self,
        name: &str,
        validator: Option<ValidatorSpec>,
    ) -> EngineResult<()> {
        let mut guard = self.collections.lock().unwrap();
        if guard.contains_key(name) {
            return Err(EngineError::Structural(format!(
                "collection '{name}' already exists"
            )));
        }
        let mut state = CollectionState::new();
        state.validator = validator;
        if state.validator.is_some() {
            state.validation_level = ValidationLevel::Strict;
        }
        guard.insert(name.to_string(), state);
        Ok(())
    }

    async fn set_validator(
        &self,
        name: &str,
        validator: Option<ValidatorSpec>,
        level: ValidationLevel,
    ) -> EngineResult<()> {
        let mut guard = self.collections.lock().unwrap();
        let state = guard
            .get_mut(name)
            .ok_or_else(|| EngineError::Structural(format!("collection '{name}' not found")))?;
        state.validator = validator;
        state.validation_level = level;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> EngineResult<()> {
        let mut guard = self.collections.lock().unwrap();
        guard.remove(name);
        Ok(())
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> EngineResult<()> {
        let mut guard = self.collections.lock().unwrap();
        let state = guard
            .entry(collection.to_string())
            .or_insert_with(CollectionState::new);
        state.documents.push(doc);
        Ok(())
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> EngineResult<()> {
        let mut guard = self.collections.lock().unwrap();
        let state = guard
            .entry(collection.to_string())
            .or_insert_with(CollectionState::new);
        state.documents.extend(docs);
        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> EngineResult<Option<Document>> {
        let guard = self.collections.lock().unwrap();
        Ok(guard
            .get(collection)
            .and_then(|s| s.documents.iter().find(|d| filter.matches(d)).cloned()))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        skip: usize,
        limit: Option<usize>,
    ) -> EngineResult<Vec<Document>> {
        let guard = self.collections.lock().unwrap();
        let Some(state) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        let matching = state.documents.iter().filter(|d| filter.matches(d)).skip(skip);
        Ok(match limit {
            Some(n) => matching.take(n).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        replacement: Document,
    ) -> EngineResult<()> {
        let mut guard = self.collections.lock().unwrap();
        let state = guard
            .get_mut(collection)
            .ok_or_else(|| EngineError::Structural(format!("collection '{collection}' not found")))?;
        if let Some(slot) = state.documents.iter_mut().find(|d| filter.matches(d)) {
            *slot = replacement;
        }
        Ok(())
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> EngineResult<u64> {
        let mut guard = self.collections.lock().unwrap();
        let Some(state) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let before = state.documents.len();
        state.documents.retain(|d| !filter.matches(d));
        Ok((before - state.documents.len()) as u64)
    }

    async fn bulk_write(&self, collection: &str, ops: Vec<BulkWriteOp>) -> EngineResult<()> {
        let mut guard = self.collections.lock().unwrap();
        let state = guard
            .entry(collection.to_string())
            .or_insert_with(CollectionState::new);
        for op in ops {
            match op {
                BulkWriteOp::InsertOne(doc) => state.documents.push(doc),
                BulkWriteOp::ReplaceById { id, replacement } => {
                    if let Some(slot) = state
                        .documents
                        .iter_mut()
                        .find(|d| doc_id(d).as_ref() == Some(&id))
                    {
                        *slot = replacement;
                    }
                }
                BulkWriteOp::DeleteByIds { ids } => {
                    state
                        .documents
                        .retain(|d| !doc_id(d).is_some_and(|id| ids.contains(&id)));
                }
            }
        }
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> EngineResult<Vec<IndexInfo>> {
        let guard = self.collections.lock().unwrap();
        Ok(guard
            .get(collection)
            .map(|s| s.indexes.clone())
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, spec: IndexSpec) -> EngineResult<String> {
        let mut guard = self.collections.lock().unwrap();
        let state = guard
            .entry(collection.to_string())
            .or_insert_with(CollectionState::new);
        let name = spec.name.clone().unwrap_or_else(|| {
            spec.key
                .iter()
                .map(|(k, dir)| format!("{k}_{dir}"))
                .collect::<Vec<_>>()
                .join("_")
        });
        if state.indexes.iter().any(|i| i.name == name) {
            return Err(EngineError::Structural(format!(
                "index '{name}' already exists"
            )));
        }
        state.indexes.push(IndexInfo {
            name: name.clone(),
            spec,
        });
        Ok(name)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> EngineResult<()> {
        let mut guard = self.collections.lock().unwrap();
        let Some(state) = guard.get_mut(collection) else {
            return Err(EngineError::Structural(format!(
                "collection '{collection}' not found"
            )));
        };
        let before = state.indexes.len();
        state.indexes.retain(|i| i.name != name);
        if state.indexes.len() == before {
            return Err(EngineError::Structural(format!("index '{name}' not found")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str) -> Document {
        json!({ "_id": id, "name": "x" }).as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_create_and_list_collections() {
        let store = MemoryStore::new();
        store.create_collection("users", None).await.unwrap();
        let names = store.list_collections(None).await.unwrap();
        assert_eq!(names, vec!["users".to_string()]);
    }

    #[tokio::test]
    async fn test_create_collection_duplicate_errors() {
        let store = MemoryStore::new();
        store.create_collection("users", None).await.unwrap();
        let result = store.create_collection("users", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryStore::new();
        store.insert_many("users", vec![doc("1"), doc("2")]).await.unwrap();
        let found = store.find("users", &Filter::all(), 0, None).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_find_one_by_id() {
        let store = MemoryStore::new();
        store.insert_many("users", vec![doc("1"), doc("2")]).await.unwrap();
        let found = store.find_one("users", &Filter::by_id("2")).await.unwrap();
        assert_eq!(found.unwrap().get("_id").unwrap(), "2");
    }

    #[tokio::test]
    async fn test_delete_many() {
        let store = MemoryStore::new();
        store.insert_many("users", vec![doc("1"), doc("2")]).await.unwrap();
        let deleted = store.delete_many("users", &Filter::by_id("1")).await.unwrap();
        assert_eq!(deleted, 1);
        let remaining = store.find("users", &Filter::all(), 0, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_write_replace_and_delete() {
        let store = MemoryStore::new();
        store.insert_many("users", vec![doc("1"), doc("2")]).await.unwrap();
        store
            .bulk_write(
                "users",
                vec![
                    BulkWriteOp::ReplaceById {
                        id: json!("1"),
                        replacement: json!({"_id": "1", "name": "y"}).as_object().unwrap().clone(),
                    },
                    BulkWriteOp::DeleteByIds { ids: vec![json!("2")] },
                ],
            )
            .await
            .unwrap();
        let remaining = store.find("users", &Filter::all(), 0, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].get("name").unwrap(), "y");
    }

    #[tokio::test]
    async fn test_create_index_and_reuse_detection() {
        let store = MemoryStore::new();
        let spec = IndexSpec {
            name: Some("email_idx".to_string()),
            key: vec![("email".to_string(), 1)],
            unique: true,
            sparse: false,
            collation: None,
            partial_filter_expression: None,
        };
        let name = store.create_index("users", spec.clone()).await.unwrap();
        assert_eq!(name, "email_idx");
        let indexes = store.list_indexes("users").await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert!(indexes[0].spec.options_eq(&spec));
    }

    #[tokio::test]
    async fn test_drop_index() {
        let store = MemoryStore::new();
        let spec = IndexSpec {
            name: Some("idx".to_string()),
            key: vec![("a".to_string(), 1)],
            unique: false,
            sparse: false,
            collation: None,
            partial_filter_expression: None,
        };
        store.create_index("users", spec).await.unwrap();
        store.drop_index("users", "idx").await.unwrap();
        assert!(store.list_indexes("users").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_index_missing_errors() {
        let store = MemoryStore::new();
        store.create_collection("users", None).await.unwrap();
        let result = store.drop_index("users", "nope").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_set_validator_and_drop_collection() {
        let store = MemoryStore::new();
        store.create_collection("users", None).await.unwrap();
        store
            .set_validator("users", Some(json!({"bsonType": "object"})), ValidationLevel::Strict)
            .await
            .unwrap();
        store.drop_collection("users").await.unwrap();
        assert!(store.list_collections(None).await.unwrap().is_empty());
    }
}
