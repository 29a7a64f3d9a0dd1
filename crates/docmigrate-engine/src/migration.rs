//! Migration records and the chain they form.
//!
//! Unlike a dependency DAG, a migration chain is strictly linear: each
//! migration names at most one parent, and the chain as a whole is the
//! unique path from the root (no parent) to the newest migration. This
//! mirrors the ordering a single ULID-suffixed, timestamp-prefixed ID
//! format already gives each migration, so there is nothing to topologically
//! sort — only a parent-pointer walk to validate and linearize.

use std::collections::HashMap;
use std::sync::Arc;

use docmigrate_core::error::{EngineError, EngineResult};

use crate::plan::Plan;
use crate::schema::SchemaSet;

/// Builds a migration's operation plan against the schema set it was
/// written against. Pure: no I/O, no reference to a live store.
pub type MigrateFn = Arc<dyn Fn(&SchemaSet) -> EngineResult<Plan> + Send + Sync>;

/// A single migration: an ID, a human name, an optional parent, the schema
/// set it was authored against, and the function that builds its plan.
#[derive(Clone)]
pub struct Migration {
    /// The migration's ID, in `YYYY_MM_DD_HHMM_<ULID>@<slug>` form.
    pub id: String,
    /// A human-readable name, independent of the ID's slug.
    pub name: String,
    /// The preceding migration's ID, or `None` if this is the chain's root.
    pub parent: Option<String>,
    /// The schema set this migration's plan is built against.
    pub schemas: SchemaSet,
    /// The function that compiles this migration's operation plan.
    pub migrate: MigrateFn,
}

impl Migration {
    /// Creates a new migration.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        parent: Option<String>,
        schemas: SchemaSet,
        migrate: MigrateFn,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent,
            schemas,
            migrate,
        }
    }

    /// Compiles this migration's plan.
    ///
    /// # Errors
    ///
    /// Propagates any error the migration's build function returns (e.g. a
    /// schema violation raised while seeding documents).
    pub fn plan(&self) -> EngineResult<Plan> {
        (self.migrate)(&self.schemas)
    }
}

/// A validated, linearized sequence of migrations, root first.
pub struct MigrationChain {
    ordered: Vec<Migration>,
}

impl MigrationChain {
    /// Links an unordered set of migrations into a validated chain.
    ///
    /// Migrations may be supplied in any order (file discovery order is not
    /// guaranteed to match chain order); this walks the parent pointers to
    /// reconstruct it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Chain`] if: any ID is duplicated, there is not
    /// exactly one root (a migration with `parent: None`), a migration names
    /// a parent that does not exist in the set, two migrations name the same
    /// parent (a fork), or the reconstructed chain does not cover every
    /// supplied migration (a cycle or a disconnected migration).
    pub fn link(migrations: Vec<Migration>) -> EngineResult<Self> {
        let mut by_id: HashMap<String, Migration> = HashMap::new();
        for m in migrations {
            let id = m.id.clone();
            if by_id.insert(id.clone(), m).is_some() {
                return Err(EngineError::Chain(format!("duplicate migration id '{id}'")));
            }
        }

        let mut children_of: HashMap<String, String> = HashMap::new();
        let mut roots = Vec::new();
        for m in by_id.values() {
            match &m.parent {
                None => roots.push(m.id.clone()),
                Some(parent_id) => {
                    if !by_id.contains_key(parent_id) {
                        return Err(EngineError::Chain(format!(
                            "migration '{}' names unknown parent '{parent_id}'",
                            m.id
                        )));
                    }
                    if let Some(existing) = children_of.insert(parent_id.clone(), m.id.clone()) {
                        return Err(EngineError::Chain(format!(
                            "migration '{parent_id}' has two children: '{existing}' and '{}'",
                            m.id
                        )));
                    }
                }
            }
        }

        if roots.len() != 1 {
            return Err(EngineError::Chain(format!(
                "chain must have exactly one root migration, found {}",
                roots.len()
            )));
        }

        let total = by_id.len();
        let mut ordered = Vec::with_capacity(total);
        let mut cursor = roots.into_iter().next().unwrap();
        loop {
            let migration = by_id.remove(&cursor).expect("cursor id is always present in by_id");
            let next = children_of.get(&cursor).cloned();
            ordered.push(migration);
            match next {
                Some(child_id) => cursor = child_id,
                None => break,
            }
        }

        if ordered.len() != total {
            return Err(EngineError::Chain(format!(
                "chain is disconnected: linked {} of {total} migrations",
                ordered.len()
            )));
        }

        Ok(Self { ordered })
    }

    /// Returns the migrations in chain order, root first.
    #[must_use]
    pub fn ordered(&self) -> &[Migration] {
        &self.ordered
    }

    /// Returns the newest (last) migration's ID, or `None` if the chain is empty.
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        self.ordered.last().map(|m| m.id.as_str())
    }

    /// Returns the migrations strictly after `from_id`, in chain order.
    ///
    /// `from_id` of `"unknown"` or `None` returns the whole chain (an
    /// instance that has never received a migration starts from scratch).
    #[must_use]
    pub fn after(&self, from_id: Option<&str>) -> &[Migration] {
        let Some(from_id) = from_id else {
            return &self.ordered;
        };
        match self.ordered.iter().position(|m| m.id == from_id) {
            Some(idx) => &self.ordered[idx + 1..],
            None => &self.ordered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Plan;

    fn stub_migration(id: &str, parent: Option<&str>) -> Migration {
        Migration::new(
            id,
            id,
            parent.map(str::to_string),
            SchemaSet::default(),
            Arc::new(|_| Ok(Plan::new())),
        )
    }

    #[test]
    fn test_link_single_root() {
        let chain = MigrationChain::link(vec![stub_migration("m1", None)]).unwrap();
        assert_eq!(chain.ordered().len(), 1);
        assert_eq!(chain.head(), Some("m1"));
    }

    #[test]
    fn test_link_linear_chain() {
        let migrations = vec![
            stub_migration("m3", Some("m2")),
            stub_migration("m1", None),
            stub_migration("m2", Some("m1")),
        ];
        let chain = MigrationChain::link(migrations).unwrap();
        let ids: Vec<_> = chain.ordered().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_link_file_order_independence() {
        let forward = vec![stub_migration("m1", None), stub_migration("m2", Some("m1"))];
        let reversed = vec![stub_migration("m2", Some("m1")), stub_migration("m1", None)];
        let a: Vec<_> = MigrationChain::link(forward).unwrap().ordered().iter().map(|m| m.id.clone()).collect();
        let b: Vec<_> = MigrationChain::link(reversed).unwrap().ordered().iter().map(|m| m.id.clone()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_link_rejects_no_root() {
        let migrations = vec![stub_migration("m1", Some("m2")), stub_migration("m2", Some("m1"))];
        assert!(MigrationChain::link(migrations).is_err());
    }

    #[test]
    fn test_link_rejects_two_roots() {
        let migrations = vec![stub_migration("m1", None), stub_migration("m2", None)];
        assert!(MigrationChain::link(migrations).is_err());
    }

    #[test]
    fn test_link_rejects_fork() {
        let migrations = vec![
            stub_migration("m1", None),
            stub_migration("m2", Some("m1")),
            stub_migration("m2b", Some("m1")),
        ];
        assert!(MigrationChain::link(migrations).is_err());
    }

    #[test]
    fn test_link_rejects_unknown_parent() {
        let migrations = vec![stub_migration("m1", Some("ghost"))];
        assert!(MigrationChain::link(migrations).is_err());
    }

    #[test]
    fn test_link_rejects_duplicate_id() {
        let migrations = vec![stub_migration("m1", None), stub_migration("m1", None)];
        let err = MigrationChain::link(migrations).unwrap_err();
        assert!(err.to_string().contains("m1"), "error must name the duplicated id: {err}");
    }

    #[test]
    fn test_after_from_unknown_returns_all() {
        let migrations = vec![stub_migration("m1", None), stub_migration("m2", Some("m1"))];
        let chain = MigrationChain::link(migrations).unwrap();
        assert_eq!(chain.after(None).len(), 2);
    }

    #[test]
    fn test_after_from_mid_chain() {
        let migrations = vec![
            stub_migration("m1", None),
            stub_migration("m2", Some("m1")),
            stub_migration("m3", Some("m2")),
        ];
        let chain = MigrationChain::link(migrations).unwrap();
        let rest: Vec<_> = chain.after(Some("m1")).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(rest, vec!["m2", "m3"]);
    }
}
