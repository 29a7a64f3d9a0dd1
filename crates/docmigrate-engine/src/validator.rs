//! Simulation-based validator: runs a migration's plan against a
//! synthetic population through the simulation applier and reports
//! schema and reversibility problems before the migration ever touches a
//! real store.
//!
//! This is a design-time check, not a runtime guard: a migration author (or
//! the orchestrator, before attempting a real apply) calls [`validate`] and
//! treats a non-empty result as "do not ship this migration".

use std::collections::BTreeMap;

use docmigrate_core::error::EngineResult;

use crate::migration::Migration;
use crate::plan::Op;
use crate::registry::discover_instances_in;
use crate::schema::{
    generate_mock_documents, generate_mock_documents_for_type, CollectionSchema, Document, FieldMap, SchemaAdapter,
    SchemaSet,
};
use crate::simulate::{apply, reverse, ApplyContext, SimulatedDatabase};

/// The kind of problem a validation run found, independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationIssueKind {
    /// A collection `M.schemas` declares is absent from the post-forward state.
    MissingCollection,
    /// A document in the post-forward state fails its declared schema.
    SchemaViolation,
    /// A collection's schema changed from the parent without a corresponding
    /// `transform_*` operation in the plan.
    MissingTransform,
    /// Reversing the plan did not reproduce the original population, or the
    /// plan (or one of its operations) refused to reverse at all.
    NotReversible,
}

/// A single problem found while validating a migration.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// What kind of problem this is.
    pub kind: ValidationIssueKind,
    /// Where the problem was found (a collection or instance name).
    pub location: String,
    /// A human-readable description.
    pub message: String,
}

impl ValidationIssue {
    fn new(kind: ValidationIssueKind, location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Tunables for population generation, independent of the migration being
/// checked. Callers typically source these from
/// [`docmigrate_core::config::EngineConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    /// How many mock documents to generate per collection/type.
    pub population_size: usize,
    /// The RNG seed driving mock-document generation, for reproducible runs.
    pub deterministic_seed: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            population_size: 3,
            deterministic_seed: 0,
        }
    }
}

const MOCK_INSTANCE_FROM: &str = "unknown";

fn seed_collections(schemas: &SchemaSet, config: &ValidatorConfig) -> BTreeMap<String, Vec<Document>> {
    let mut out = BTreeMap::new();
    for (name, fields) in &schemas.collections {
        out.insert(
            name.clone(),
            generate_mock_documents(fields, config.population_size, config.deterministic_seed),
        );
    }
    for (name, type_map) in &schemas.multi_collections {
        let mut docs = Vec::new();
        for (type_name, fields) in type_map {
            docs.extend(generate_mock_documents_for_type(
                type_name,
                fields,
                config.population_size,
                config.deterministic_seed,
            ));
        }
        out.insert(name.clone(), docs);
    }
    out
}

fn mock_instance_content(type_map: &BTreeMap<String, FieldMap>, model_type: &str, config: &ValidatorConfig) -> Vec<Document> {
    let mut content = vec![
        serde_json::json!({
            "_id": crate::schema::TYPE_INFORMATION,
            "_type": crate::schema::TYPE_INFORMATION,
            "collectionType": model_type,
            "createdAt": MOCK_INSTANCE_FROM,
        })
        .as_object()
        .unwrap()
        .clone(),
        serde_json::json!({
            "_id": crate::schema::TYPE_MIGRATIONS,
            "_type": crate::schema::TYPE_MIGRATIONS,
            "fromMigrationId": MOCK_INSTANCE_FROM,
            "appliedMigrations": [],
        })
        .as_object()
        .unwrap()
        .clone(),
    ];
    for (type_name, fields) in type_map {
        content.extend(generate_mock_documents_for_type(
            type_name,
            fields,
            config.population_size,
            config.deterministic_seed,
        ));
    }
    content
}

/// Synthesizes a mock instance for every fan-out op in `plan` whose model
/// type currently has no discoverable instance, so `up`/`down` are always
/// exercised even against a brand-new chain.
fn synthesize_missing_instances(state: &mut SimulatedDatabase, schemas: &SchemaSet, plan_ops: &[Op], migration_id: &str, config: &ValidatorConfig) {
    let mut model_types: Vec<&str> = Vec::new();
    for op in plan_ops {
        match op {
            Op::SeedMultiModelInstancesType { model_type, .. }
            | Op::TransformMultiModelInstancesType { model_type, .. } => {
                if !model_types.contains(&model_type.as_str()) {
                    model_types.push(model_type);
                }
            }
            _ => {}
        }
    }

    for model_type in model_types {
        if !discover_instances_in(state, model_type, migration_id).is_empty() {
            continue;
        }
        let Some(type_map) = schemas.multi_models.get(model_type) else {
            continue;
        };
        let name = format!("__mock_{model_type}");
        state
            .multi_models
            .insert(name, mock_instance_content(type_map, model_type, config));
    }
}

/// Checks that every collection `schemas` declares exists in `state`, and
/// that every document in it validates against its declared schema.
fn check_post_state(state: &SimulatedDatabase, schemas: &SchemaSet, issues: &mut Vec<ValidationIssue>) {
    for name in schemas.collections.keys() {
        let Some(content) = state.collections.get(name) else {
            issues.push(ValidationIssue::new(
                ValidationIssueKind::MissingCollection,
                name,
                "collection declared in schema but absent from post-migration state",
            ));
            continue;
        };
        let adapter = CollectionSchema(schemas.collections[name].clone());
        for doc in content {
            let outcome = adapter.parse(doc);
            if !outcome.ok {
                issues.push(ValidationIssue::new(
                    ValidationIssueKind::SchemaViolation,
                    name,
                    format!("document {:?} fails declared schema: {:?}", doc.get("_id"), outcome.issues),
                ));
            }
        }
    }

    for name in schemas.multi_collections.keys() {
        check_union_collection(state.collections.get(name), schemas, name, issues);
    }
}

fn check_union_collection(content: Option<&Vec<Document>>, schemas: &SchemaSet, name: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(content) = content else {
        issues.push(ValidationIssue::new(
            ValidationIssueKind::MissingCollection,
            name,
            "multi-collection declared in schema but absent from post-migration state",
        ));
        return;
    };
    let Some(union) = schemas.union_for(name) else {
        return;
    };
    for doc in content {
        let outcome = union.parse(doc);
        if !outcome.ok {
            issues.push(ValidationIssue::new(
                ValidationIssueKind::SchemaViolation,
                name,
                format!("document {:?} fails declared union schema: {:?}", doc.get("_id"), outcome.issues),
            ));
        }
    }
}

/// Detects a field-map that changed shape from `parent_schemas` to
/// `schemas` with no corresponding `transform_*` op in `plan_ops` touching
/// that collection.
fn check_missing_transforms(
    parent_schemas: &SchemaSet,
    schemas: &SchemaSet,
    plan_ops: &[Op],
    issues: &mut Vec<ValidationIssue>,
) {
    let touches = |name: &str| {
        plan_ops.iter().any(|op| match op {
            Op::TransformCollection { name: n, .. }
            | Op::TransformMultiCollectionType { name: n, .. }
            | Op::TransformMultiModelInstanceType { name: n, .. } => n == name,
            Op::TransformMultiModelInstancesType { model_type, .. } => model_type == name,
            _ => false,
        })
    };

    for (name, fields) in &schemas.collections {
        if let Some(old_fields) = parent_schemas.collections.get(name) {
            if old_fields != fields && !touches(name) {
                issues.push(ValidationIssue::new(
                    ValidationIssueKind::MissingTransform,
                    name,
                    "schema changed from the parent migration with no transform operation for this collection",
                ));
            }
        }
    }
}

/// Validates `migration` against a synthetic population, optionally seeded
/// from `parent_schemas` (the schema set declared by its parent migration,
/// or `None` if it is the chain's root).
///
/// # Errors
///
/// Propagates any error the migration's build function itself raises (a
/// malformed `migrate` closure is a build-time failure, not a validation
/// finding).
pub fn validate(
    migration: &Migration,
    parent_schemas: Option<&SchemaSet>,
    config: &ValidatorConfig,
) -> EngineResult<Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    let plan = migration.plan()?;

    let source_schemas = parent_schemas.cloned().unwrap_or_default();
    let mut state = SimulatedDatabase::new(false);
    state.collections = seed_collections(&source_schemas, config);

    synthesize_missing_instances(&mut state, &migration.schemas, &plan.operations, &migration.id, config);
    let original_population = state.clone();

    let ctx = ApplyContext {
        migration_id: &migration.id,
        strict: false,
    };

    let mut forward_failed = false;
    for op in &plan.operations {
        match apply(&state, op, &ctx) {
            Ok(next) => state = next,
            Err(err) => {
                issues.push(ValidationIssue::new(
                    ValidationIssueKind::SchemaViolation,
                    format!("{op:?}"),
                    format!("forward apply failed: {err}"),
                ));
                forward_failed = true;
                break;
            }
        }
    }

    if forward_failed {
        return Ok(issues);
    }

    check_post_state(&state, &migration.schemas, &mut issues);
    if let Some(parent_schemas) = parent_schemas {
        check_missing_transforms(parent_schemas, &migration.schemas, &plan.operations, &mut issues);
    }

    if plan.is_irreversible() {
        return Ok(issues);
    }

    let mut reversed = state;
    let mut reverse_failed = false;
    for op in plan.operations.iter().rev() {
        match reverse(&reversed, op, &ctx) {
            Ok(next) => reversed = next,
            Err(err) => {
                issues.push(ValidationIssue::new(
                    ValidationIssueKind::NotReversible,
                    format!("{op:?}"),
                    format!("reverse failed: {err}"),
                ));
                reverse_failed = true;
                break;
            }
        }
    }

    if !reverse_failed
        && (reversed.collections != original_population.collections
            || reversed.multi_models != original_population.multi_models)
    {
        issues.push(ValidationIssue::new(
            ValidationIssueKind::NotReversible,
            migration.id.clone(),
            "reversing the plan did not reproduce the pre-forward population",
        ));
    }

    Ok(issues)
}
