//! Schema adapter: wraps a field map as a runtime validator, a
//! store-side constraint emitter, and an index-annotation extractor.
//!
//! The schema DSL a real deployment authors migrations against is treated
//! as opaque upstream of this crate; what the kernel actually consumes is
//! the fixed capability set this module exposes: `parse`,
//! `emit_store_validator`, `extract_indexes`, and `sanitize_path_name`.
//! [`FieldMap`] is the concrete, serializable schema-node representation
//! the rest of the engine is built against.

use std::collections::BTreeMap;

use docmigrate_core::error::SchemaIssue;
use docmigrate_core::utils::text::slugify;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::Word;
use fake::faker::name::en::Name;
use fake::Fake;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document is a JSON object.
pub type Document = Map<String, Value>;

/// The `_type` tag reserved for multi-model instance metadata.
pub const TYPE_INFORMATION: &str = "_information";
/// The `_type` tag reserved for multi-model migration-lineage metadata.
pub const TYPE_MIGRATIONS: &str = "_migrations";

/// The primitive shape a field can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    /// A UTF-8 string.
    String,
    /// A 64-bit floating point number.
    Number,
    /// A boolean.
    Bool,
    /// Any JSON value, unconstrained.
    Any,
    /// An array of the given element type.
    Array(Box<FieldType>),
    /// A nested object with its own field map.
    Object(FieldMap),
}

/// A single field's declared shape and constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// The field's value shape.
    pub field_type: FieldType,
    /// Whether the field must be present.
    pub required: bool,
    /// Whether `null` is an acceptable value in addition to `field_type`.
    pub nullable: bool,
    /// The value to inject when the field is absent and not required.
    pub default: Option<Value>,
    /// Whether this field should receive a unique index.
    pub unique_index: bool,
    /// Whether this field should receive a (non-unique) index.
    pub indexed: bool,
    /// Whether a string value is trimmed during `parse`.
    pub trim: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub pattern: Option<String>,
    pub enum_values: Option<Vec<Value>>,
}

impl FieldSchema {
    /// A required field of the given primitive type with no other constraints.
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
            nullable: false,
            default: None,
            unique_index: false,
            indexed: false,
            trim: false,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            pattern: None,
            enum_values: None,
        }
    }

    /// An optional field of the given primitive type with no other constraints.
    pub fn optional(field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(field_type)
        }
    }

    /// Marks this field as carrying a unique index.
    pub fn with_unique_index(mut self) -> Self {
        self.unique_index = true;
        self
    }

    /// Marks this field as carrying a (non-unique) index.
    pub fn with_index(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Sets the default value injected when the field is absent.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Marks this field nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Trims string values during `parse`.
    pub fn trimmed(mut self) -> Self {
        self.trim = true;
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn minimum(mut self, n: f64) -> Self {
        self.minimum = Some(n);
        self
    }

    pub fn maximum(mut self, n: f64) -> Self {
        self.maximum = Some(n);
        self
    }

    pub fn pattern(mut self, re: impl Into<String>) -> Self {
        self.pattern = Some(re.into());
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// A field-map schema node: field name -> declared shape.
pub type FieldMap = BTreeMap<String, FieldSchema>;

/// An index annotation discovered by walking a schema, carrying the
/// dot-joined path to the indexed field and whether it is unique.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexAnnotation {
    /// Dot-joined path to the field, e.g. `"profile.email"`.
    pub path: String,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

fn type_matches(field_type: &FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::Any => true,
        FieldType::String => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Bool => value.is_boolean(),
        FieldType::Array(elem) => value
            .as_array()
            .is_some_and(|items| items.iter().all(|v| type_matches(elem, v))),
        FieldType::Object(fields) => value.as_object().is_some_and(|obj| {
            parse_against(fields, obj, String::new()).1.is_empty()
        }),
    }
}

fn type_name(field_type: &FieldType) -> &'static str {
    match field_type {
        FieldType::Any => "any",
        FieldType::String => "string",
        FieldType::Number => "number",
        FieldType::Bool => "bool",
        FieldType::Array(_) => "array",
        FieldType::Object(_) => "object",
    }
}

/// Validates `doc` against `fields`, returning the normalized document
/// (with defaults injected) and any issues found. An empty issue list means
/// the document is valid.
fn parse_against(fields: &FieldMap, doc: &Document, path_prefix: String) -> (Document, Vec<SchemaIssue>) {
    let mut output = doc.clone();
    let mut issues = Vec::new();

    for (name, field) in fields {
        let full_path = if path_prefix.is_empty() {
            name.clone()
        } else {
            format!("{path_prefix}.{name}")
        };

        match doc.get(name) {
            None => {
                if let Some(default) = &field.default {
                    output.insert(name.clone(), default.clone());
                } else if field.required {
                    issues.push(SchemaIssue::new(full_path, "required field is missing", "required"));
                }
            }
            Some(Value::Null) if field.nullable => {}
            Some(value) => {
                if !type_matches(&field.field_type, value) {
                    issues.push(SchemaIssue::new(
                        full_path,
                        format!("expected {}", type_name(&field.field_type)),
                        "type",
                    ));
                } else {
                    let trimmed = if field.trim {
                        value.as_str().map(|s| Value::String(s.trim().to_string()))
                    } else {
                        None
                    };
                    let checked = trimmed.as_ref().unwrap_or(value);
                    issues.extend(check_constraints(field, checked, &full_path));
                    if let Some(trimmed) = trimmed {
                        output.insert(name.clone(), trimmed);
                    }
                }
            }
        }
    }

    (output, issues)
}

/// Checks the value-level constraints (length, range, pattern, enum) a field
/// declares, beyond the bare type match `type_matches` already covers.
fn check_constraints(field: &FieldSchema, value: &Value, path: &str) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();

    if let Some(s) = value.as_str() {
        if let Some(min) = field.min_length {
            if s.chars().count() < min {
                issues.push(SchemaIssue::new(path, format!("shorter than minLength {min}"), "min_length"));
            }
        }
        if let Some(max) = field.max_length {
            if s.chars().count() > max {
                issues.push(SchemaIssue::new(path, format!("longer than maxLength {max}"), "max_length"));
            }
        }
        if let Some(pattern) = &field.pattern {
            match regex::Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => {
                    issues.push(SchemaIssue::new(path, format!("does not match pattern {pattern}"), "pattern"));
                }
                Ok(_) => {}
                Err(_) => issues.push(SchemaIssue::new(path, format!("invalid pattern {pattern}"), "pattern")),
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = field.minimum {
            if n < min {
                issues.push(SchemaIssue::new(path, format!("below minimum {min}"), "minimum"));
            }
        }
        if let Some(max) = field.maximum {
            if n > max {
                issues.push(SchemaIssue::new(path, format!("above maximum {max}"), "maximum"));
            }
        }
    }

    if let Some(allowed) = &field.enum_values {
        if !allowed.contains(value) {
            issues.push(SchemaIssue::new(path, "value is not one of the allowed enum values", "enum"));
        }
    }

    issues
}

/// Resolves two duplicate constraints declared on the same path across
/// union variants into the single value the store-side validator should
/// enforce: `minLength`/`minItems`/`minimum` take the max of the two (the
/// stricter lower bound), `maxLength`/`maxItems`/`maximum` take the min (the
/// stricter upper bound), and any other keyword is kept as-is from the first
/// declaration (patterns are conjoined by the caller instead of merged here).
pub fn merge_constraint(keyword: &str, existing: f64, incoming: f64) -> f64 {
    if keyword.starts_with("min") {
        existing.max(incoming)
    } else if keyword.starts_with("max") {
        existing.min(incoming)
    } else {
        existing
    }
}

/// Merges two declarations of the same field (same name, same type) seen
/// across different union variants into the single set of constraints the
/// store-side validator should enforce for that field, via
/// [`merge_constraint`]: the stricter bound wins on both ends, and differing
/// patterns are conjoined rather than one silently shadowing the other.
fn merge_field_schemas(existing: &FieldSchema, incoming: &FieldSchema) -> FieldSchema {
    let mut merged = existing.clone();

    merged.min_length = match (existing.min_length, incoming.min_length) {
        (Some(x), Some(y)) => Some(merge_constraint("minLength", x as f64, y as f64) as usize),
        (x, y) => x.or(y),
    };
    merged.max_length = match (existing.max_length, incoming.max_length) {
        (Some(x), Some(y)) => Some(merge_constraint("maxLength", x as f64, y as f64) as usize),
        (x, y) => x.or(y),
    };
    merged.minimum = match (existing.minimum, incoming.minimum) {
        (Some(x), Some(y)) => Some(merge_constraint("minimum", x, y)),
        (x, y) => x.or(y),
    };
    merged.maximum = match (existing.maximum, incoming.maximum) {
        (Some(x), Some(y)) => Some(merge_constraint("maximum", x, y)),
        (x, y) => x.or(y),
    };
    merged.pattern = match (&existing.pattern, &incoming.pattern) {
        (Some(x), Some(y)) if x != y => Some(format!("(?={x})(?={y})")),
        (Some(x), _) => Some(x.clone()),
        (None, Some(y)) => Some(y.clone()),
        (None, None) => None,
    };

    merged
}

/// Folds every variant's field map into one name -> reconciled-schema table,
/// merging constraints wherever the same field name recurs with the same
/// type across variants (see [`merge_field_schemas`]). A name that recurs
/// with a *different* type across variants is left out here and each
/// variant keeps its own declaration unmerged, since there is no single
/// constraint set that would make sense across incompatible types.
fn reconcile_shared_fields(variants: &BTreeMap<String, FieldMap>) -> BTreeMap<String, FieldSchema> {
    let mut merged: BTreeMap<String, FieldSchema> = BTreeMap::new();
    for fields in variants.values() {
        for (name, field) in fields {
            match merged.get(name) {
                Some(existing) if existing.field_type == field.field_type => {
                    let combined = merge_field_schemas(existing, field);
                    merged.insert(name.clone(), combined);
                }
                Some(_) => {}
                None => {
                    merged.insert(name.clone(), field.clone());
                }
            }
        }
    }
    merged
}

/// Walks a field map collecting every field's index annotation, for callers
/// (the real applier's `update_indexes`) that hold a bare [`FieldMap`]
/// rather than a [`SchemaAdapter`] implementor.
pub fn extract_indexes(fields: &FieldMap) -> Vec<IndexAnnotation> {
    extract_indexes_from(fields, "")
}

/// Walks a field map collecting index annotations at any depth.
fn extract_indexes_from(fields: &FieldMap, path_prefix: &str) -> Vec<IndexAnnotation> {
    let mut out = Vec::new();
    for (name, field) in fields {
        let full_path = if path_prefix.is_empty() {
            name.clone()
        } else {
            format!("{path_prefix}.{name}")
        };
        if field.unique_index || field.indexed {
            out.push(IndexAnnotation {
                path: full_path.clone(),
                unique: field.unique_index,
            });
        }
        if let FieldType::Object(nested) = &field.field_type {
            out.extend(extract_indexes_from(nested, &full_path));
        }
    }
    out
}

fn field_type_to_validator(field_type: &FieldType) -> Value {
    match field_type {
        FieldType::Any => serde_json::json!({}),
        FieldType::String => serde_json::json!({"bsonType": "string"}),
        FieldType::Number => serde_json::json!({"bsonType": "number"}),
        FieldType::Bool => serde_json::json!({"bsonType": "bool"}),
        FieldType::Array(elem) => {
            serde_json::json!({"bsonType": "array", "items": field_type_to_validator(elem)})
        }
        FieldType::Object(fields) => field_map_to_validator(fields),
    }
}

/// Emits a single field's validator fragment, folding in its value-level
/// constraints alongside the bare type.
fn field_schema_to_validator(field: &FieldSchema) -> Value {
    let mut v = field_type_to_validator(&field.field_type);
    let Some(obj) = v.as_object_mut() else {
        return v;
    };
    if let Some(n) = field.min_length {
        obj.insert("minLength".to_string(), serde_json::json!(n));
    }
    if let Some(n) = field.max_length {
        obj.insert("maxLength".to_string(), serde_json::json!(n));
    }
    if let Some(n) = field.minimum {
        obj.insert("minimum".to_string(), serde_json::json!(n));
    }
    if let Some(n) = field.maximum {
        obj.insert("maximum".to_string(), serde_json::json!(n));
    }
    if let Some(pattern) = &field.pattern {
        obj.insert("pattern".to_string(), serde_json::json!(pattern));
    }
    if let Some(values) = &field.enum_values {
        obj.insert("enum".to_string(), Value::Array(values.clone()));
    }
    v
}

fn field_map_to_validator(fields: &FieldMap) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, field) in fields {
        properties.insert(name.clone(), field_schema_to_validator(field));
        if field.required {
            required.push(Value::String(name.clone()));
        }
    }
    serde_json::json!({
        "bsonType": "object",
        "properties": Value::Object(properties),
        "required": Value::Array(required),
        "additionalProperties": true,
    })
}

/// The outcome of validating a document against a schema node.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// Whether the document is valid.
    pub ok: bool,
    /// The normalized document (defaults injected), regardless of `ok`.
    pub output: Document,
    /// Issues found, empty iff `ok`.
    pub issues: Vec<SchemaIssue>,
}

/// The four capabilities the engine requires of any schema node.
pub trait SchemaAdapter {
    /// Validates and normalizes `value`, injecting defaults.
    fn parse(&self, value: &Document) -> ParseOutcome;

    /// Emits a JSON-Schema-like validator object for the store's native
    /// validator feature.
    fn emit_store_validator(&self) -> Value;

    /// Walks the schema for index annotations at any depth.
    fn extract_indexes(&self) -> Vec<IndexAnnotation>;

    /// Deterministically maps a dot path to a legal index name.
    fn sanitize_path_name(&self, path: &str) -> String {
        slugify(&path.replace('.', "_"))
    }
}

/// A plain collection schema: one field map, one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema(pub FieldMap);

impl SchemaAdapter for CollectionSchema {
    fn parse(&self, value: &Document) -> ParseOutcome {
        let (output, issues) = parse_against(&self.0, value, String::new());
        ParseOutcome {
            ok: issues.is_empty(),
            output,
            issues,
        }
    }

    fn emit_store_validator(&self) -> Value {
        field_map_to_validator(&self.0)
    }

    fn extract_indexes(&self) -> Vec<IndexAnnotation> {
        extract_indexes_from(&self.0, "")
    }
}

/// A tagged union over one or more `{_type: T} + typeMap[T]` variants, plus
/// the two reserved metadata variants. Used to validate documents in
/// multi-collections and multi-model instances.
#[derive(Debug, Clone)]
pub struct UnionSchema {
    /// Tag value -> field map, for the user-declared variants.
    pub variants: BTreeMap<String, FieldMap>,
    /// Whether to also accept the reserved `_information`/`_migrations` shapes.
    pub include_metadata: bool,
}

impl UnionSchema {
    /// Builds a union schema from a type map (as used by multi-collections
    /// and multi-model templates), including the reserved metadata variants.
    pub fn from_type_map(type_map: &BTreeMap<String, FieldMap>) -> Self {
        Self {
            variants: type_map.clone(),
            include_metadata: true,
        }
    }

    /// Builds a union restricted to a single tagged variant (used when
    /// seeding or transforming one type within a multi-collection/model).
    pub fn single(type_name: &str, fields: &FieldMap) -> Self {
        let mut variants = BTreeMap::new();
        variants.insert(type_name.to_string(), fields.clone());
        Self {
            variants,
            include_metadata: false,
        }
    }
}

impl SchemaAdapter for UnionSchema {
    fn parse(&self, value: &Document) -> ParseOutcome {
        let Some(tag) = value.get("_type").and_then(Value::as_str) else {
            return ParseOutcome {
                ok: false,
                output: value.clone(),
                issues: vec![SchemaIssue::new("_type", "missing discriminator", "required")],
            };
        };

        if self.include_metadata && (tag == TYPE_INFORMATION || tag == TYPE_MIGRATIONS) {
            return ParseOutcome {
                ok: true,
                output: value.clone(),
                issues: Vec::new(),
            };
        }

        let Some(fields) = self.variants.get(tag) else {
            return ParseOutcome {
                ok: false,
                output: value.clone(),
                issues: vec![SchemaIssue::new(
                    "_type",
                    format!("unknown type tag '{tag}'"),
                    "enum",
                )],
            };
        };

        let (output, issues) = parse_against(fields, value, String::new());
        ParseOutcome {
            ok: issues.is_empty(),
            output,
            issues,
        }
    }

    fn emit_store_validator(&self) -> Value {
        let reconciled_fields = reconcile_shared_fields(&self.variants);

        let mut any_of: Vec<Value> = self
            .variants
            .iter()
            .map(|(tag, fields)| {
                let fields: FieldMap = fields
                    .iter()
                    .map(|(name, field)| {
                        let resolved = reconciled_fields
                            .get(name)
                            .filter(|merged| merged.field_type == field.field_type)
                            .cloned()
                            .unwrap_or_else(|| field.clone());
                        (name.clone(), resolved)
                    })
                    .collect();

                let mut v = field_map_to_validator(&fields);
                if let Some(obj) = v.as_object_mut() {
                    let mut properties = obj
                        .get("properties")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    properties.insert("_type".to_string(), serde_json::json!({"enum": [tag]}));
                    obj.insert("properties".to_string(), Value::Object(properties));
                }
                v
            })
            .collect();

        if self.include_metadata {
            any_of.push(serde_json::json!({
                "bsonType": "object",
                "properties": {"_type": {"enum": [TYPE_INFORMATION]}},
            }));
            any_of.push(serde_json::json!({
                "bsonType": "object",
                "properties": {"_type": {"enum": [TYPE_MIGRATIONS]}},
            }));
        }

        serde_json::json!({"anyOf": any_of})
    }

    fn extract_indexes(&self) -> Vec<IndexAnnotation> {
        let mut seen = BTreeMap::new();
        for fields in self.variants.values() {
            for ann in extract_indexes_from(fields, "") {
                seen.entry(ann.path.clone()).or_insert(ann);
            }
        }
        seen.into_values().collect()
    }
}

/// The complete declared shape of a database: a mapping from category to
/// named schemas.
///
/// Invariant: every physical collection name appears in exactly one of the
/// three maps.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    /// Plain collections: name -> field map.
    pub collections: BTreeMap<String, FieldMap>,
    /// Multi-collections: name -> type name -> field map.
    pub multi_collections: BTreeMap<String, BTreeMap<String, FieldMap>>,
    /// Multi-models: model name -> type name -> field map.
    pub multi_models: BTreeMap<String, BTreeMap<String, FieldMap>>,
}

impl SchemaSet {
    /// Creates an empty schema set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the union schema for a multi-collection or multi-model by name.
    pub fn union_for(&self, name: &str) -> Option<UnionSchema> {
        self.multi_collections
            .get(name)
            .or_else(|| self.multi_models.get(name))
            .map(UnionSchema::from_type_map)
    }
}

/// Generates a deterministic population of mock documents against a field
/// map, for the simulation validator's forward/reverse round-trip check.
/// The same `(fields, count, seed)` triple always yields the same
/// documents, so a failed validation run is reproducible.
#[must_use]
pub fn generate_mock_documents(fields: &FieldMap, count: usize, seed: u64) -> Vec<Document> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| mock_object(fields, &mut rng)).collect()
}

/// Generates a deterministic population tagged with `_type`, for a single
/// variant of a multi-collection or multi-model schema.
#[must_use]
pub fn generate_mock_documents_for_type(type_name: &str, fields: &FieldMap, count: usize, seed: u64) -> Vec<Document> {
    generate_mock_documents(fields, count, seed)
        .into_iter()
        .map(|mut doc| {
            doc.insert("_type".to_string(), Value::String(type_name.to_string()));
            doc
        })
        .collect()
}

fn mock_object(fields: &FieldMap, rng: &mut StdRng) -> Document {
    let mut doc = Document::new();
    for (name, field) in fields {
        if field.nullable && rng.gen_bool(0.1) {
            doc.insert(name.clone(), Value::Null);
            continue;
        }
        doc.insert(name.clone(), mock_value(name, field, rng));
    }
    doc
}

fn mock_value(name: &str, field: &FieldSchema, rng: &mut StdRng) -> Value {
    if let Some(allowed) = &field.enum_values {
        if !allowed.is_empty() {
            let idx = rng.gen_range(0..allowed.len());
            return allowed[idx].clone();
        }
    }

    match &field.field_type {
        FieldType::String => Value::String(mock_string(name, field, rng)),
        FieldType::Number => {
            let min = field.minimum.unwrap_or(0.0);
            let max = field.maximum.unwrap_or(min + 1000.0);
            Value::from(rng.gen_range(min..=max))
        }
        FieldType::Bool => Value::Bool(rng.gen_bool(0.5)),
        FieldType::Any => Value::String(Word().fake_with_rng(rng)),
        FieldType::Array(elem) => {
            let len = rng.gen_range(0..3);
            let inner = FieldSchema::required((**elem).clone());
            Value::Array((0..len).map(|_| mock_value(name, &inner, rng)).collect())
        }
        FieldType::Object(nested) => Value::Object(mock_object(nested, rng)),
    }
}

/// Picks a plausible generator by field name (`email`, `name`, `id` get
/// realistic fakes) and otherwise falls back to a lorem word, then clamps to
/// any declared length bounds.
fn mock_string(name: &str, field: &FieldSchema, rng: &mut StdRng) -> String {
    let lower = name.to_ascii_lowercase();
    let mut s: String = if lower.contains("email") {
        SafeEmail().fake_with_rng(rng)
    } else if lower.contains("name") {
        Name().fake_with_rng(rng)
    } else {
        Word().fake_with_rng(rng)
    };

    if let Some(max) = field.max_length {
        s.truncate(max);
    }
    if let Some(min) = field.min_length {
        while s.chars().count() < min {
            s.push('x');
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_field() -> FieldSchema {
        FieldSchema::required(FieldType::String)
    }

    #[test]
    fn test_collection_schema_parse_ok() {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), string_field());
        let schema = CollectionSchema(fields);

        let mut doc = Document::new();
        doc.insert("name".to_string(), Value::String("Alice".to_string()));
        let outcome = schema.parse(&doc);
        assert!(outcome.ok);
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn test_collection_schema_parse_missing_required() {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), string_field());
        let schema = CollectionSchema(fields);

        let doc = Document::new();
        let outcome = schema.parse(&doc);
        assert!(!outcome.ok);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].code, "required");
    }

    #[test]
    fn test_collection_schema_parse_wrong_type() {
        let mut fields = FieldMap::new();
        fields.insert("age".to_string(), FieldSchema::required(FieldType::Number));
        let schema = CollectionSchema(fields);

        let mut doc = Document::new();
        doc.insert("age".to_string(), Value::String("old".to_string()));
        let outcome = schema.parse(&doc);
        assert!(!outcome.ok);
        assert_eq!(outcome.issues[0].code, "type");
    }

    #[test]
    fn test_collection_schema_default_injection() {
        let mut fields = FieldMap::new();
        fields.insert(
            "role".to_string(),
            FieldSchema::optional(FieldType::String).with_default(Value::String("member".to_string())),
        );
        let schema = CollectionSchema(fields);

        let doc = Document::new();
        let outcome = schema.parse(&doc);
        assert!(outcome.ok);
        assert_eq!(outcome.output.get("role").unwrap(), "member");
    }

    #[test]
    fn test_extract_indexes_nested() {
        let mut profile_fields = FieldMap::new();
        profile_fields.insert(
            "email".to_string(),
            FieldSchema::required(FieldType::String).with_unique_index(),
        );

        let mut fields = FieldMap::new();
        fields.insert(
            "profile".to_string(),
            FieldSchema::required(FieldType::Object(profile_fields)),
        );
        let schema = CollectionSchema(fields);

        let indexes = schema.extract_indexes();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].path, "profile.email");
        assert!(indexes[0].unique);
    }

    #[test]
    fn test_sanitize_path_name() {
        let schema = CollectionSchema(FieldMap::new());
        assert_eq!(schema.sanitize_path_name("profile.email"), "profile_email");
    }

    #[test]
    fn test_union_schema_parse_by_tag() {
        let mut admin_fields = FieldMap::new();
        admin_fields.insert("level".to_string(), FieldSchema::required(FieldType::Number));
        let mut type_map = BTreeMap::new();
        type_map.insert("admin".to_string(), admin_fields);
        let union = UnionSchema::from_type_map(&type_map);

        let mut doc = Document::new();
        doc.insert("_type".to_string(), Value::String("admin".to_string()));
        doc.insert("level".to_string(), serde_json::json!(3));
        let outcome = union.parse(&doc);
        assert!(outcome.ok);
    }

    #[test]
    fn test_union_schema_accepts_metadata_tags() {
        let type_map = BTreeMap::new();
        let union = UnionSchema::from_type_map(&type_map);

        let mut doc = Document::new();
        doc.insert("_type".to_string(), Value::String(TYPE_INFORMATION.to_string()));
        let outcome = union.parse(&doc);
        assert!(outcome.ok);
    }

    #[test]
    fn test_union_schema_unknown_tag_rejected() {
        let type_map = BTreeMap::new();
        let union = UnionSchema::from_type_map(&type_map);

        let mut doc = Document::new();
        doc.insert("_type".to_string(), Value::String("mystery".to_string()));
        let outcome = union.parse(&doc);
        assert!(!outcome.ok);
    }

    #[test]
    fn test_schema_set_union_for_missing() {
        let set = SchemaSet::new();
        assert!(set.union_for("nope").is_none());
    }

    #[test]
    fn test_union_schema_merges_shared_field_constraints_across_variants() {
        let mut admin_fields = FieldMap::new();
        admin_fields.insert(
            "bio".to_string(),
            FieldSchema::optional(FieldType::String).min_length(10).max_length(100),
        );
        let mut guest_fields = FieldMap::new();
        guest_fields.insert(
            "bio".to_string(),
            FieldSchema::optional(FieldType::String).min_length(2).max_length(50),
        );
        let mut type_map = BTreeMap::new();
        type_map.insert("admin".to_string(), admin_fields);
        type_map.insert("guest".to_string(), guest_fields);
        let union = UnionSchema::from_type_map(&type_map);

        let validator = union.emit_store_validator();
        let any_of = validator.get("anyOf").and_then(Value::as_array).unwrap();

        for branch in any_of {
            let Some(bio) = branch.pointer("/properties/bio") else {
                continue;
            };
            assert_eq!(bio.get("minLength").unwrap(), &serde_json::json!(10));
            assert_eq!(bio.get("maxLength").unwrap(), &serde_json::json!(50));
        }
    }

    #[test]
    fn test_union_schema_does_not_merge_same_named_field_of_different_types() {
        let mut admin_fields = FieldMap::new();
        admin_fields.insert("tag".to_string(), FieldSchema::required(FieldType::Number).minimum(1.0));
        let mut guest_fields = FieldMap::new();
        guest_fields.insert("tag".to_string(), FieldSchema::required(FieldType::String).min_length(3));
        let mut type_map = BTreeMap::new();
        type_map.insert("admin".to_string(), admin_fields);
        type_map.insert("guest".to_string(), guest_fields);
        let union = UnionSchema::from_type_map(&type_map);

        let validator = union.emit_store_validator();
        let any_of = validator.get("anyOf").and_then(Value::as_array).unwrap();

        let admin_branch = any_of
            .iter()
            .find(|b| b.pointer("/properties/tag/bsonType") == Some(&serde_json::json!("number")))
            .unwrap();
        assert_eq!(admin_branch.pointer("/properties/tag/minimum").unwrap(), &serde_json::json!(1.0));

        let guest_branch = any_of
            .iter()
            .find(|b| b.pointer("/properties/tag/bsonType") == Some(&serde_json::json!("string")))
            .unwrap();
        assert_eq!(guest_branch.pointer("/properties/tag/minLength").unwrap(), &serde_json::json!(3));
    }
}
