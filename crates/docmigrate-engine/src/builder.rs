//! Plan builder: a fluent, two-level state machine that compiles a
//! migration's target schemas and imperative steps into a [`Plan`].
//!
//! Top-level calls on [`PlanBuilder`] select a target (a collection, a
//! multi-collection, a multi-model instance, or a whole model for
//! fan-out); the returned sub-builder restricts the verbs available for
//! that target, enforced statically by each sub-builder being a distinct
//! type. `end()`/`done()` hands control back to the parent.

use std::collections::BTreeMap;
use std::sync::Arc;

use docmigrate_core::error::{EngineError, EngineResult};

use crate::plan::{Op, Plan, PlanProperty, Transform};
use crate::schema::{Document, FieldMap, SchemaSet};

/// A pure, fallible document transform supplied by migration authors.
pub type TransformFn = Arc<dyn Fn(&Document) -> Result<Document, String> + Send + Sync>;

/// The top-level plan builder. Every migration compiles its plan by
/// threading one of these through a chain of calls, ending in [`compile`](Self::compile).
pub struct PlanBuilder<'s> {
    schemas: &'s SchemaSet,
    plan: Plan,
}

impl<'s> PlanBuilder<'s> {
    /// Creates a builder against the target schemas declared by the
    /// migration being compiled.
    pub fn new(schemas: &'s SchemaSet) -> Self {
        Self {
            schemas,
            plan: Plan::new(),
        }
    }

    /// Pushes `create_collection`; marks the plan `lossy` (creation cannot
    /// be undone without losing whatever was seeded afterward).
    pub fn create_collection(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let schema = self.schemas.collections.get(&name).cloned();
        self.plan.operations.push(Op::CreateCollection { name, schema });
        self.plan.properties.insert(PlanProperty::Lossy);
        self
    }

    /// Selects an existing (or about-to-be-created) collection for chained
    /// seed/transform calls.
    pub fn collection(self, name: impl Into<String>) -> CollectionBuilder<'s> {
        CollectionBuilder {
            parent: self,
            name: name.into(),
        }
    }

    /// Pushes `create_multicollection` for a new tagged collection.
    pub fn new_multi_collection(
        mut self,
        name: impl Into<String>,
        type_map: BTreeMap<String, FieldMap>,
    ) -> Self {
        self.plan.operations.push(Op::CreateMultiCollection {
            name: name.into(),
            type_map,
        });
        self.plan.properties.insert(PlanProperty::Lossy);
        self
    }

    /// Selects a multi-collection for chained per-type seed/transform calls.
    pub fn multi_collection(self, name: impl Into<String>) -> MultiCollectionBuilder<'s> {
        MultiCollectionBuilder {
            parent: self,
            name: name.into(),
        }
    }

    /// Pushes `create_multimodel_instance` for a new physical instance of a
    /// template.
    pub fn new_multi_model_instance(
        mut self,
        name: impl Into<String>,
        model_type: impl Into<String>,
    ) -> Self {
        let model_type = model_type.into();
        let type_map = self
            .schemas
            .multi_models
            .get(&model_type)
            .cloned()
            .unwrap_or_default();
        self.plan.operations.push(Op::CreateMultiModelInstance {
            name: name.into(),
            model_type,
            type_map,
        });
        self.plan.properties.insert(PlanProperty::Lossy);
        self
    }

    /// Selects a single multi-model instance by collection name for chained
    /// per-type seed/transform calls (non-fan-out).
    pub fn instance(self, name: impl Into<String>) -> InstanceBuilder<'s> {
        InstanceBuilder {
            parent: self,
            name: name.into(),
        }
    }

    /// Selects a model type for fan-out seed/transform across every
    /// discovered, admitted instance.
    pub fn multi_model(self, model_type: impl Into<String>) -> MultiModelBuilder<'s> {
        MultiModelBuilder {
            parent: self,
            model_type: model_type.into(),
        }
    }

    /// Pushes `mark_as_multimodel`, turning an existing plain collection
    /// into a multi-model instance in place.
    pub fn mark_multi_model_type(
        mut self,
        name: impl Into<String>,
        model_type: impl Into<String>,
    ) -> Self {
        self.plan.operations.push(Op::MarkAsMultiModel {
            name: name.into(),
            model_type: model_type.into(),
        });
        self
    }

    /// Pushes `update_indexes`, resolving the schema from the owning
    /// migration's declared schema set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Structural`] if `name` names neither a
    /// collection nor a multi-collection/multi-model in the schema set.
    pub fn update_indexes(mut self, name: impl Into<String>) -> EngineResult<Self> {
        let name = name.into();
        let schema = self
            .schemas
            .collections
            .get(&name)
            .cloned()
            .or_else(|| flatten_union(self.schemas.multi_collections.get(&name)))
            .or_else(|| flatten_union(self.schemas.multi_models.get(&name)))
            .ok_or_else(|| EngineError::Structural(format!("schema not found for '{name}'")))?;
        self.plan.operations.push(Op::UpdateIndexes { name, schema });
        Ok(self)
    }

    /// Finalizes the builder into a [`Plan`].
    pub fn compile(self) -> Plan {
        self.plan
    }
}

fn flatten_union(type_map: Option<&BTreeMap<String, FieldMap>>) -> Option<FieldMap> {
    type_map.map(|types| {
        let mut merged = FieldMap::new();
        for fields in types.values() {
            for (k, v) in fields {
                merged.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        merged
    })
}

fn validate_documents(schema: &FieldMap, documents: &[Document]) -> EngineResult<()> {
    use crate::schema::{CollectionSchema, SchemaAdapter};
    let adapter = CollectionSchema(schema.clone());
    for doc in documents {
        let outcome = adapter.parse(doc);
        if !outcome.ok {
            return Err(EngineError::SchemaViolation {
                collection: String::new(),
                type_name: None,
                issues: outcome.issues,
            });
        }
    }
    Ok(())
}

/// Sub-builder scoped to a single plain collection.
pub struct CollectionBuilder<'s> {
    parent: PlanBuilder<'s>,
    name: String,
}

impl<'s> CollectionBuilder<'s> {
    /// Pushes `seed_collection`, validating every document against the
    /// schema declared for this collection in the owning migration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SchemaViolation`] if any document fails to
    /// validate; the plan is left unmodified in that case.
    pub fn seed(mut self, documents: Vec<Document>) -> EngineResult<PlanBuilder<'s>> {
        let schema = self
            .parent
            .schemas
            .collections
            .get(&self.name)
            .cloned()
            .ok_or_else(|| EngineError::Structural(format!("schema not found for '{}'", self.name)))?;
        validate_documents(&schema, &documents).map_err(|e| annotate(e, &self.name, None))?;
        self.parent.plan.operations.push(Op::SeedCollection {
            name: self.name,
            schema,
            documents,
        });
        Ok(self.parent)
    }

    /// Pushes `transform_collection`.
    pub fn transform(
        mut self,
        up: TransformFn,
        down: TransformFn,
        irreversible: bool,
    ) -> PlanBuilder<'s> {
        if irreversible {
            self.parent.plan.properties.insert(PlanProperty::Irreversible);
        }
        self.parent.plan.operations.push(Op::TransformCollection {
            name: self.name,
            up: up as Transform,
            down: down as Transform,
            irreversible,
        });
        self.parent
    }

    /// Returns to the parent builder without pushing any operation.
    pub fn end(self) -> PlanBuilder<'s> {
        self.parent
    }
}

fn annotate(err: EngineError, name: &str, type_name: Option<&str>) -> EngineError {
    match err {
        EngineError::SchemaViolation { issues, .. } => EngineError::SchemaViolation {
            collection: name.to_string(),
            type_name: type_name.map(str::to_string),
            issues,
        },
        other => other,
    }
}

/// Sub-builder scoped to a multi-collection, selecting verbs per tagged type.
pub struct MultiCollectionBuilder<'s> {
    parent: PlanBuilder<'s>,
    name: String,
}

impl<'s> MultiCollectionBuilder<'s> {
    /// Pushes `seed_multicollection_type` for the given tag, validating
    /// against `{_type: literal(typeName)} ⊕ typeMap[typeName]`.
    pub fn seed_type(
        mut self,
        type_name: impl Into<String>,
        documents: Vec<Document>,
    ) -> EngineResult<PlanBuilder<'s>> {
        let type_name = type_name.into();
        let schema = self
            .parent
            .schemas
            .multi_collections
            .get(&self.name)
            .and_then(|types| types.get(&type_name))
            .cloned()
            .ok_or_else(|| {
                EngineError::Structural(format!(
                    "schema not found for '{}' type '{type_name}'",
                    self.name
                ))
            })?;
        validate_documents(&schema, &documents)
            .map_err(|e| annotate(e, &self.name, Some(&type_name)))?;
        self.parent.plan.operations.push(Op::SeedMultiCollectionType {
            name: self.name,
            type_name,
            schema,
            documents,
        });
        Ok(self.parent)
    }

    /// Selects a tagged type within this multi-collection for a transform call.
    pub fn type_(self, type_name: impl Into<String>) -> MultiCollectionTypeBuilder<'s> {
        MultiCollectionTypeBuilder {
            parent: self.parent,
            name: self.name,
            type_name: type_name.into(),
        }
    }
}

/// Sub-builder scoped to one tagged type within a multi-collection.
pub struct MultiCollectionTypeBuilder<'s> {
    parent: PlanBuilder<'s>,
    name: String,
    type_name: String,
}

impl<'s> MultiCollectionTypeBuilder<'s> {
    /// Pushes `transform_multicollection_type`.
    pub fn transform(
        mut self,
        up: TransformFn,
        down: TransformFn,
        irreversible: bool,
    ) -> PlanBuilder<'s> {
        if irreversible {
            self.parent.plan.properties.insert(PlanProperty::Irreversible);
        }
        self.parent.plan.operations.push(Op::TransformMultiCollectionType {
            name: self.name,
            type_name: self.type_name,
            up: up as Transform,
            down: down as Transform,
            irreversible,
        });
        self.parent
    }
}

/// Sub-builder scoped to a single multi-model instance (by collection name),
/// selecting verbs per tagged type without fanning out to other instances.
pub struct InstanceBuilder<'s> {
    parent: PlanBuilder<'s>,
    name: String,
}

impl<'s> InstanceBuilder<'s> {
    /// Pushes `seed_multimodel_instance_type` for this single instance.
    pub fn seed_type(
        mut self,
        model_type: &str,
        type_name: impl Into<String>,
        documents: Vec<Document>,
    ) -> EngineResult<PlanBuilder<'s>> {
        let type_name = type_name.into();
        let schema = self
            .parent
            .schemas
            .multi_models
            .get(model_type)
            .and_then(|types| types.get(&type_name))
            .cloned()
            .ok_or_else(|| {
                EngineError::Structural(format!(
                    "schema not found for model '{model_type}' type '{type_name}'"
                ))
            })?;
        validate_documents(&schema, &documents)
            .map_err(|e| annotate(e, &self.name, Some(&type_name)))?;
        self.parent.plan.operations.push(Op::SeedMultiModelInstanceType {
            name: self.name,
            type_name,
            schema,
            documents,
        });
        Ok(self.parent)
    }

    /// Selects a tagged type within this instance for a transform call.
    pub fn type_(self, type_name: impl Into<String>) -> InstanceTypeBuilder<'s> {
        InstanceTypeBuilder {
            parent: self.parent,
            name: self.name,
            type_name: type_name.into(),
        }
    }
}

/// Sub-builder scoped to one tagged type within a single instance.
pub struct InstanceTypeBuilder<'s> {
    parent: PlanBuilder<'s>,
    name: String,
    type_name: String,
}

impl<'s> InstanceTypeBuilder<'s> {
    /// Pushes `transform_multimodel_instance_type` for this single instance.
    pub fn transform(
        mut self,
        up: TransformFn,
        down: TransformFn,
        irreversible: bool,
    ) -> PlanBuilder<'s> {
        if irreversible {
            self.parent.plan.properties.insert(PlanProperty::Irreversible);
        }
        self.parent
            .plan
            .operations
            .push(Op::TransformMultiModelInstanceType {
                name: self.name,
                type_name: self.type_name,
                up: up as Transform,
                down: down as Transform,
                irreversible,
            });
        self.parent
    }
}

/// Sub-builder scoped to a whole model type, for fan-out seed/transform
/// across every discovered, admitted instance.
pub struct MultiModelBuilder<'s> {
    parent: PlanBuilder<'s>,
    model_type: String,
}

impl<'s> MultiModelBuilder<'s> {
    /// Selects a tagged type for fan-out seed/transform.
    pub fn type_(self, type_name: impl Into<String>) -> MultiModelTypeBuilder<'s> {
        MultiModelTypeBuilder {
            parent: self.parent,
            model_type: self.model_type,
            type_name: type_name.into(),
        }
    }
}

/// Sub-builder scoped to one tagged type across an entire model (fan-out).
pub struct MultiModelTypeBuilder<'s> {
    parent: PlanBuilder<'s>,
    model_type: String,
    type_name: String,
}

impl<'s> MultiModelTypeBuilder<'s> {
    /// Pushes `seed_multimodel_instances_type` (fan-out).
    pub fn seed(mut self, documents: Vec<Document>) -> EngineResult<PlanBuilder<'s>> {
        let schema = self
            .parent
            .schemas
            .multi_models
            .get(&self.model_type)
            .and_then(|types| types.get(&self.type_name))
            .cloned()
            .ok_or_else(|| {
                EngineError::Structural(format!(
                    "schema not found for model '{}' type '{}'",
                    self.model_type, self.type_name
                ))
            })?;
        validate_documents(&schema, &documents)
            .map_err(|e| annotate(e, &self.model_type, Some(&self.type_name)))?;
        self.parent.plan.operations.push(Op::SeedMultiModelInstancesType {
            model_type: self.model_type,
            type_name: self.type_name,
            schema,
            documents,
        });
        Ok(self.parent)
    }

    /// Pushes `transform_multimodel_instances_type` (fan-out).
    pub fn transform(
        mut self,
        up: TransformFn,
        down: TransformFn,
        irreversible: bool,
    ) -> PlanBuilder<'s> {
        if irreversible {
            self.parent.plan.properties.insert(PlanProperty::Irreversible);
        }
        self.parent
            .plan
            .operations
            .push(Op::TransformMultiModelInstancesType {
                model_type: self.model_type,
                type_name: self.type_name,
                up: up as Transform,
                down: down as Transform,
                irreversible,
            });
        self.parent
    }
}
