//! Migration IDs and the version guard.
//!
//! A migration ID has the form `YYYY_MM_DD_HHMM_<ULID>@<slug>`. The portion
//! before `@` is the timestamp prefix, which is lexicographically
//! comparable by construction (fixed-width, zero-padded components) and is
//! the sole ordering key used by the version guard.

use docmigrate_core::utils::text::slugify;
use ulid::Ulid;

/// The special token meaning "no migration has ever been applied" or "apply
/// unconditionally", depending on which side of the comparison it appears.
pub const TOKEN_UNKNOWN: &str = "unknown";
/// The special token used on an instance's `fromMigrationId` to mean
/// "always receive the current migration".
pub const TOKEN_CURRENT: &str = "current";

/// Builds a migration ID from a timestamp prefix, a fresh ULID, and a
/// human-readable name (slugified).
///
/// `year`, `month`, `day`, `hour`, `minute` are zero-padded to preserve the
/// fixed-width property the version guard's lexicographic compare depends on.
pub fn generate_id(year: i32, month: u32, day: u32, hour: u32, minute: u32, name: &str) -> String {
    let prefix = timestamp_prefix(year, month, day, hour, minute);
    let ulid = Ulid::new();
    let slug = slugify(name);
    format!("{prefix}_{ulid}@{slug}")
}

/// Formats a zero-padded timestamp prefix from its components.
pub fn timestamp_prefix(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> String {
    format!("{year:04}_{month:02}_{day:02}_{hour:02}{minute:02}")
}

/// Returns the text before `@`, the ordering key for a migration ID.
///
/// Returns the whole string if no `@` is present (tolerates the special
/// tokens, which never contain `@`).
pub fn prefix_of(id: &str) -> &str {
    id.split('@').next().unwrap_or(id)
}

/// Returns the slug (text after `@`) of a migration ID, or `None` if the ID
/// has no `@`.
pub fn slug_of(id: &str) -> Option<&str> {
    id.split_once('@').map(|(_, slug)| slug)
}

/// The version guard: decides whether an instance whose template was last
/// updated at `instance_from` should receive a migration with the given ID.
///
/// An instance receives migration `M` iff `instance.fromMigrationId <= M`
/// under lexicographic compare of timestamp prefixes. The special tokens
/// `"unknown"` and `"current"` on the instance side always receive;
/// `"unknown"` as the current migration ID also always receives (an instance
/// created before any chain existed has nothing to compare against).
pub fn should_instance_receive_migration(instance_from: &str, migration_id: &str) -> bool {
    if instance_from == TOKEN_UNKNOWN || instance_from == TOKEN_CURRENT {
        return true;
    }
    if migration_id == TOKEN_UNKNOWN {
        return true;
    }
    prefix_of(instance_from) <= prefix_of(migration_id)
}
