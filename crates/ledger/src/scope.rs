//! Scope normalization and overlap classification.
//!
//! A scope is a filesystem path or a path-prefix pattern (trailing `*`).
//! Two differently-worded scopes can still collide — `src/lib` and
//! `src/lib/parser.ts` claim overlapping territory — so conflicts are
//! surfaced through a three-way classification rather than string
//! equality.

use serde::{Deserialize, Serialize};

/// How two scopes relate after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeOverlap {
    /// Identical after normalization.
    Exact,
    /// One is an ancestor directory of the other, or a wildcard prefix
    /// matching the other.
    Partial,
    /// Neither of the above.
    Disjoint,
}

/// Normalize a raw scope string: forward slashes, collapsed separators,
/// lowercased, no trailing separator. Wildcards are preserved.
pub fn normalize_scope(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.trim().chars() {
        let ch = if ch == '\\' { '/' } else { ch };
        if ch == '/' {
            if last_was_sep {
                continue;
            }
            last_was_sep = true;
        } else {
            last_was_sep = false;
        }
        out.extend(ch.to_lowercase());
    }
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Classify the overlap between two scopes.
pub fn classify_overlap(a: &str, b: &str) -> ScopeOverlap {
    let a = normalize_scope(a);
    let b = normalize_scope(b);
    if a == b {
        ScopeOverlap::Exact
    } else if covers(&a, &b) || covers(&b, &a) {
        ScopeOverlap::Partial
    } else {
        ScopeOverlap::Disjoint
    }
}

/// Whether `outer` contains `inner`: wildcard-prefix match, or ancestor
/// directory at a path-component boundary.
fn covers(outer: &str, inner: &str) -> bool {
    if let Some(prefix) = outer.strip_suffix('*') {
        return inner.starts_with(prefix);
    }
    inner.starts_with(&format!("{outer}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_after_normalization() {
        assert_eq!(
            classify_overlap("src/lib/a.ts", "src/lib/a.ts"),
            ScopeOverlap::Exact
        );
        assert_eq!(
            classify_overlap("src/lib/", "SRC//lib"),
            ScopeOverlap::Exact
        );
        assert_eq!(
            classify_overlap(r"src\lib", "src/lib"),
            ScopeOverlap::Exact
        );
    }

    #[test]
    fn test_ancestor_directory_is_partial() {
        assert_eq!(
            classify_overlap("src/lib", "src/lib/parser.ts"),
            ScopeOverlap::Partial
        );
        // Either direction.
        assert_eq!(
            classify_overlap("src/lib/parser.ts", "src/lib"),
            ScopeOverlap::Partial
        );
    }

    #[test]
    fn test_wildcard_prefix_is_partial() {
        assert_eq!(
            classify_overlap("src/*", "src/lib/a.ts"),
            ScopeOverlap::Partial
        );
        assert_eq!(
            classify_overlap("src/lib/a.ts", "src/*"),
            ScopeOverlap::Partial
        );
    }

    #[test]
    fn test_sibling_directories_are_disjoint() {
        assert_eq!(
            classify_overlap("src/lib", "src/components"),
            ScopeOverlap::Disjoint
        );
    }

    #[test]
    fn test_shared_name_prefix_is_not_ancestry() {
        // "src/lib" is not an ancestor of "src/library" — the boundary
        // must fall on a path component.
        assert_eq!(
            classify_overlap("src/lib", "src/library/a.ts"),
            ScopeOverlap::Disjoint
        );
    }

    #[test]
    fn test_wildcard_matches_bare_name_prefix() {
        // A trailing * is a string prefix, not a component boundary.
        assert_eq!(
            classify_overlap("src/lib*", "src/library/a.ts"),
            ScopeOverlap::Partial
        );
    }

    #[test]
    fn test_normalize_scope() {
        assert_eq!(normalize_scope("  Src\\Lib\\ "), "src/lib");
        assert_eq!(normalize_scope("src//lib///parser.ts"), "src/lib/parser.ts");
        assert_eq!(normalize_scope("src/*"), "src/*");
    }
}
