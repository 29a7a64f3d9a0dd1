//! String utility functions.

use regex::Regex;
use std::sync::OnceLock;

/// Converts a string to a filesystem-safe slug.
///
/// Converts to lowercase, removes non-alphanumeric characters (except
/// hyphens, underscores and spaces), replaces spaces with hyphens, and
/// collapses consecutive hyphens. Used to turn a migration's human-readable
/// name into the `<slug>` suffix of its ID.
///
/// # Examples
///
/// ```
/// use docmigrate_core::utils::text::slugify;
///
/// assert_eq!(slugify("Add User Email Index"), "add-user-email-index");
/// assert_eq!(slugify("  Spaced  Out  "), "spaced-out");
/// assert_eq!(slugify("already-slugged"), "already-slugged");
/// ```
pub fn slugify(s: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    static MULTI_HYPHEN: OnceLock<Regex> = OnceLock::new();

    let non_alnum = NON_ALNUM.get_or_init(|| Regex::new(r"[^\w\s-]").unwrap());
    let multi_hyphen = MULTI_HYPHEN.get_or_init(|| Regex::new(r"[-\s]+").unwrap());

    let s = s.to_lowercase();
    let s = non_alnum.replace_all(&s, "");
    let s = multi_hyphen.replace_all(&s, "-");
    let s = s.trim_matches('-');
    s.to_string()
}
