//! Operation plan IR: the closed, tagged set of operations a compiled
//! migration plan is made of, plus the declarative properties attached to a
//! plan as a whole.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::schema::{Document, FieldMap};

/// A pure document-to-document transform function.
///
/// `up`/`down` must be pure: no closing over mutable state, no I/O. They are
/// run once per document (or, for fan-out ops, once per admitted instance's
/// documents) by the simulation applier and the real applier.
pub type Transform = Arc<dyn Fn(&Document) -> Result<Document, String> + Send + Sync>;

/// A declarative flag describing a property of a compiled plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlanProperty {
    /// Forward execution cannot be undone without information loss.
    Lossy,
    /// The plan refuses to reverse at all.
    Irreversible,
}

/// The closed set of operations a plan can contain.
///
/// Each variant carries exactly the fields needed to apply and reverse it;
/// no operation references another operation's identity.
#[derive(Clone)]
pub enum Op {
    /// Creates a new plain collection, optionally installing its schema
    /// immediately.
    CreateCollection {
        /// The collection name.
        name: String,
        /// The field map, if known at creation time.
        schema: Option<FieldMap>,
    },
    /// Creates a new multi-collection (a single collection holding
    /// documents tagged by `_type`).
    CreateMultiCollection {
        /// The collection name.
        name: String,
        /// Tag -> field map for every declared type.
        type_map: std::collections::BTreeMap<String, FieldMap>,
    },
    /// Creates a new physical instance of a multi-model template.
    CreateMultiModelInstance {
        /// The instance's collection name.
        name: String,
        /// The model (template) name this instance belongs to.
        model_type: String,
        /// Tag -> field map for every declared type in the template.
        type_map: std::collections::BTreeMap<String, FieldMap>,
    },
    /// Marks an already-existing plain collection as a multi-model instance,
    /// inserting the reserved metadata documents.
    MarkAsMultiModel {
        /// The collection name.
        name: String,
        /// The model this collection becomes an instance of.
        model_type: String,
    },
    /// Appends documents to a plain collection.
    SeedCollection {
        /// The collection name.
        name: String,
        /// The schema documents are validated against.
        schema: FieldMap,
        /// The documents to insert.
        documents: Vec<Document>,
    },
    /// Appends tagged documents to a multi-collection.
    SeedMultiCollectionType {
        /// The collection name.
        name: String,
        /// The `_type` tag the documents carry.
        type_name: String,
        /// The schema for this type.
        schema: FieldMap,
        /// The documents to insert (stamped with `_type` if absent).
        documents: Vec<Document>,
    },
    /// Appends tagged documents to a single multi-model instance.
    SeedMultiModelInstanceType {
        /// The instance's collection name.
        name: String,
        /// The `_type` tag the documents carry.
        type_name: String,
        /// The schema for this type.
        schema: FieldMap,
        /// The documents to insert.
        documents: Vec<Document>,
    },
    /// Appends tagged documents to every discovered, admitted instance of a
    /// multi-model (fan-out).
    SeedMultiModelInstancesType {
        /// The model (template) name.
        model_type: String,
        /// The `_type` tag the documents carry.
        type_name: String,
        /// The schema for this type.
        schema: FieldMap,
        /// The documents to insert into every admitted instance.
        documents: Vec<Document>,
    },
    /// Transforms every document in a plain collection.
    TransformCollection {
        /// The collection name.
        name: String,
        /// The forward transform.
        up: Transform,
        /// The reverse transform.
        down: Transform,
        /// Whether reversing this operation is refused even though `down`
        /// is provided.
        irreversible: bool,
    },
    /// Transforms every document of one tagged type in a multi-collection.
    TransformMultiCollectionType {
        /// The collection name.
        name: String,
        /// The `_type` tag selecting which documents are transformed.
        type_name: String,
        /// The forward transform.
        up: Transform,
        /// The reverse transform.
        down: Transform,
        /// Whether reversing this operation is refused.
        irreversible: bool,
    },
    /// Transforms every document of one tagged type in a single instance.
    TransformMultiModelInstanceType {
        /// The instance's collection name.
        name: String,
        /// The `_type` tag selecting which documents are transformed.
        type_name: String,
        /// The forward transform.
        up: Transform,
        /// The reverse transform.
        down: Transform,
        /// Whether reversing this operation is refused.
        irreversible: bool,
    },
    /// Transforms every document of one tagged type across every
    /// discovered, admitted instance of a multi-model (fan-out).
    TransformMultiModelInstancesType {
        /// The model (template) name.
        model_type: String,
        /// The `_type` tag selecting which documents are transformed.
        type_name: String,
        /// The forward transform.
        up: Transform,
        /// The reverse transform.
        down: Transform,
        /// Whether reversing this operation is refused.
        irreversible: bool,
    },
    /// Synchronizes a collection's indexes to match those declared by its schema.
    UpdateIndexes {
        /// The collection (or instance) name.
        name: String,
        /// The schema indexes are derived from.
        schema: FieldMap,
    },
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Op::CreateCollection { name, .. } => format!("CreateCollection({name})"),
            Op::CreateMultiCollection { name, .. } => format!("CreateMultiCollection({name})"),
            Op::CreateMultiModelInstance { name, model_type, .. } => {
                format!("CreateMultiModelInstance({name}, {model_type})")
            }
            Op::MarkAsMultiModel { name, model_type } => {
                format!("MarkAsMultiModel({name}, {model_type})")
            }
            Op::SeedCollection { name, documents, .. } => {
                format!("SeedCollection({name}, {} docs)", documents.len())
            }
            Op::SeedMultiCollectionType { name, type_name, documents, .. } => {
                format!("SeedMultiCollectionType({name}, {type_name}, {} docs)", documents.len())
            }
            Op::SeedMultiModelInstanceType { name, type_name, documents, .. } => {
                format!("SeedMultiModelInstanceType({name}, {type_name}, {} docs)", documents.len())
            }
            Op::SeedMultiModelInstancesType { model_type, type_name, documents, .. } => format!(
                "SeedMultiModelInstancesType({model_type}, {type_name}, {} docs)",
                documents.len()
            ),
            Op::TransformCollection { name, irreversible, .. } => {
                format!("TransformCollection({name}, irreversible={irreversible})")
            }
            Op::TransformMultiCollectionType { name, type_name, irreversible, .. } => format!(
                "TransformMultiCollectionType({name}, {type_name}, irreversible={irreversible})"
            ),
            Op::TransformMultiModelInstanceType { name, type_name, irreversible, .. } => format!(
                "TransformMultiModelInstanceType({name}, {type_name}, irreversible={irreversible})"
            ),
            Op::TransformMultiModelInstancesType { model_type, type_name, irreversible, .. } => format!(
                "TransformMultiModelInstancesType({model_type}, {type_name}, irreversible={irreversible})"
            ),
            Op::UpdateIndexes { name, .. } => format!("UpdateIndexes({name})"),
        };
        f.write_str(&label)
    }
}

impl Op {
    /// Returns `true` if this operation is marked irreversible.
    pub fn is_irreversible(&self) -> bool {
        matches!(
            self,
            Op::TransformCollection { irreversible: true, .. }
                | Op::TransformMultiCollectionType { irreversible: true, .. }
                | Op::TransformMultiModelInstanceType { irreversible: true, .. }
                | Op::TransformMultiModelInstancesType { irreversible: true, .. }
        )
    }
}

/// A compiled migration plan: an ordered operation sequence plus the
/// declarative properties accumulated while building it.
#[derive(Clone, Default)]
pub struct Plan {
    /// Flags describing the plan as a whole.
    pub properties: BTreeSet<PlanProperty>,
    /// The operations, in the order they must be applied.
    pub operations: Vec<Op>,
}

impl Plan {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if any operation, or the plan itself, is marked
    /// irreversible.
    pub fn is_irreversible(&self) -> bool {
        self.properties.contains(&PlanProperty::Irreversible)
            || self.operations.iter().any(Op::is_irreversible)
    }

    /// Returns `true` if the plan is marked lossy.
    pub fn is_lossy(&self) -> bool {
        self.properties.contains(&PlanProperty::Lossy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_plan_not_irreversible() {
        let plan = Plan::new();
        assert!(!plan.is_irreversible());
        assert!(!plan.is_lossy());
    }

    #[test]
    fn test_plan_property_irreversible_flag() {
        let mut plan = Plan::new();
        plan.properties.insert(PlanProperty::Irreversible);
        assert!(plan.is_irreversible());
    }

    #[test]
    fn test_op_irreversible_transform() {
        let op = Op::TransformCollection {
            name: "users".to_string(),
            up: Arc::new(|d| Ok(d.clone())),
            down: Arc::new(|d| Ok(d.clone())),
            irreversible: true,
        };
        assert!(op.is_irreversible());
        let mut plan = Plan::new();
        plan.operations.push(op);
        assert!(plan.is_irreversible());
    }

    #[test]
    fn test_op_debug_labels() {
        let op = Op::CreateCollection {
            name: "users".to_string(),
            schema: None,
        };
        assert_eq!(format!("{op:?}"), "CreateCollection(users)");
    }
}
