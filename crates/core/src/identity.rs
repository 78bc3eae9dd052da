//! Canonical project identity.
//!
//! Every subscription, coalescer slot, and stored snapshot is keyed by the
//! identity of the project root that produced it. Raw paths arrive in many
//! spellings (trailing separators, mixed case on case-insensitive
//! filesystems, backslashes from Windows-born tooling), so the key is a
//! normalized form rather than the path itself.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Canonical, case- and separator-insensitive key derived from a project
/// root path.
///
/// Two paths that refer to the same directory normalize to the same
/// identity. The inner string is the normalized form: forward slashes,
/// no trailing separator, lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectIdentity(String);

impl ProjectIdentity {
    /// Derive the identity for a project root path.
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        Self(normalize(&root.as_ref().to_string_lossy()))
    }

    /// The normalized key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short display name: the last path component of the normalized root.
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ProjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Path> for ProjectIdentity {
    fn from(path: &Path) -> Self {
        Self::from_root(path)
    }
}

/// Normalize a raw path string into the canonical key form.
fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.chars() {
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
    // Strip trailing separator, but never reduce "/" to the empty string.
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}
