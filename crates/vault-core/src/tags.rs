//! Tag normalization and association diffing.
//!
//! Tag identity is keyed by a canonical name: lowercase, trimmed, with every
//! internal whitespace run collapsed into a single hyphen. Everything that
//! resolves, counts, or compares tags goes through [`normalize_tag_name`] first
//! so that `"Go"`, `" go "` and `"GO"` are the same tag.

use std::collections::HashSet;

use crate::defaults::TAG_NAME_MAX_LEN;
use crate::error::{Error, Result};

/// Canonicalize a raw tag string into its lookup key.
///
/// ```
/// use vault_core::tags::normalize_tag_name;
///
/// assert_eq!(normalize_tag_name("  Rust  Lang "), "rust-lang");
/// ```
pub fn normalize_tag_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Normalize and deduplicate a requested tag list.
///
/// First-seen order is preserved. A name that normalizes to nothing, or to
/// something longer than [`TAG_NAME_MAX_LEN`], makes the whole set malformed.
pub fn normalize_tag_set<S: AsRef<str>>(raw: &[S]) -> Result<Vec<String>> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut names = Vec::with_capacity(raw.len());

    for name in raw {
        let canonical = normalize_tag_name(name.as_ref());
        if canonical.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "Tag name {:?} is empty after normalization",
                name.as_ref()
            )));
        }
        if canonical.chars().count() > TAG_NAME_MAX_LEN {
            return Err(Error::InvalidArgument(format!(
                "Tag name must be {} characters or less",
                TAG_NAME_MAX_LEN
            )));
        }
        if seen.insert(canonical.clone()) {
            names.push(canonical);
        }
    }

    Ok(names)
}

/// Set difference between a record's current tags and a requested tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Requested but not currently associated (request order).
    pub to_add: Vec<String>,
    /// Currently associated but not requested (current order).
    pub to_remove: Vec<String>,
}

impl TagDiff {
    /// True when applying the diff would change nothing.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute `requested − current` and `current − requested`.
///
/// Both inputs are expected to be canonical names; `requested` is
/// deduplicated here as well so callers can pass raw request order.
pub fn diff_tags<C, R>(current: &[C], requested: &[R]) -> TagDiff
where
    C: AsRef<str>,
    R: AsRef<str>,
{
    let current_set: HashSet<&str> = current.iter().map(AsRef::as_ref).collect();
    let requested_set: HashSet<&str> = requested.iter().map(AsRef::as_ref).collect();

    let mut added = HashSet::new();
    let to_add = requested
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !current_set.contains(name) && added.insert(*name))
        .map(String::from)
        .collect();

    let to_remove = current
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !requested_set.contains(name))
        .map(String::from)
        .collect();

    TagDiff { to_add, to_remove }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_whitespace_variants_agree() {
        let variants = ["Go", "go ", " GO", "\tgo\n", "gO"];
        for v in variants {
            assert_eq!(normalize_tag_name(v), "go", "variant {:?}", v);
        }
    }

    #[test]
    fn test_normalize_internal_whitespace_becomes_single_hyphen() {
        assert_eq!(normalize_tag_name("machine learning"), "machine-learning");
        assert_eq!(normalize_tag_name("machine   learning"), "machine-learning");
        assert_eq!(normalize_tag_name("Machine \t Learning"), "machine-learning");
    }

    #[test]
    fn test_normalize_keeps_existing_hyphens() {
        assert_eq!(normalize_tag_name("already-canonical"), "already-canonical");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_tag_name("  Deep   Work ");
        assert_eq!(normalize_tag_name(&once), once);
    }

    #[test]
    fn test_normalize_unicode_lowercase() {
        assert_eq!(normalize_tag_name("Ärger Über"), "ärger-über");
    }

    #[test]
    fn test_normalize_blank_is_empty() {
        assert_eq!(normalize_tag_name("   "), "");
    }

    #[test]
    fn test_tag_set_dedups_equivalent_names() {
        let names = normalize_tag_set(&["Go", "go ", "Rust"]).unwrap();
        assert_eq!(names, vec!["go".to_string(), "rust".to_string()]);
    }

    #[test]
    fn test_tag_set_rejects_blank_name() {
        let err = normalize_tag_set(&["go", "  "]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_tag_set_rejects_overlong_name() {
        let long = "x".repeat(TAG_NAME_MAX_LEN + 1);
        let err = normalize_tag_set(&[long]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_tag_set_empty_input() {
        let names = normalize_tag_set::<&str>(&[]).unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_diff_add_and_remove() {
        let diff = diff_tags(&["go", "web"], &["go", "rust"]);
        assert_eq!(diff.to_add, vec!["rust"]);
        assert_eq!(diff.to_remove, vec!["web"]);
    }

    #[test]
    fn test_diff_same_set_is_empty() {
        let diff = diff_tags(&["go", "rust"], &["rust", "go"]);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_dedups_requested() {
        let diff = diff_tags::<&str, &str>(&[], &["go", "go", "rust"]);
        assert_eq!(diff.to_add, vec!["go", "rust"]);
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_diff_empty_request_removes_everything() {
        let diff = diff_tags::<&str, &str>(&["a", "b"], &[]);
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove, vec!["a", "b"]);
    }

    #[test]
    fn test_diff_is_deterministic() {
        let current = ["a", "b", "c"];
        let requested = ["c", "d", "e"];
        assert_eq!(
            diff_tags(&current, &requested),
            diff_tags(&current, &requested)
        );
    }

    #[test]
    fn test_applied_diff_rediffs_empty() {
        let current = vec!["a".to_string(), "b".to_string()];
        let requested = vec!["b".to_string(), "c".to_string()];
        let diff = diff_tags(&current, &requested);

        let mut applied: Vec<String> = current
            .into_iter()
            .filter(|t| !diff.to_remove.contains(t))
            .collect();
        applied.extend(diff.to_add.iter().cloned());

        assert!(diff_tags(&applied, &requested).is_empty());
    }
}
