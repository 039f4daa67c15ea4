//! Reference mount table: maps cache paths to their backing location.
//!
//! Resolution is a longest-prefix match on whole path components; the root
//! mount point `/` is a valid match of length one. An entry whose prefix is
//! known but currently unmounted is reported as such, so the caller can mark
//! the entry "unknown" instead of treating the reference copy as missing.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// One configured mapping from a cache subtree to its reference tier root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    /// Human-readable name for logs and reports.
    pub name: String,
    /// Cache-side path prefix this entry covers.
    pub cache_root: String,
    /// Reference-side root the prefix maps onto.
    pub reference_root: String,
    /// Whether the reference location is currently mounted.
    pub mounted: bool,
}

impl MountEntry {
    /// Translates a cache path under this entry to its reference path.
    ///
    /// Returns `None` if the path is not under `cache_root`.
    pub fn reference_path(&self, cache_path: &str) -> Option<String> {
        let rest = strip_component_prefix(cache_path, &self.cache_root)?;
        if rest.is_empty() {
            return Some(self.reference_root.clone());
        }
        let mut out = self.reference_root.trim_end_matches('/').to_string();
        out.push('/');
        out.push_str(rest);
        Some(out)
    }
}

/// Strips `prefix` from `path` at a component boundary.
///
/// `"/fs/data"` is a prefix of `"/fs/data/x"` but not of `"/fs/database"`.
/// Returns the remainder without its leading `/`.
fn strip_component_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path.strip_prefix('/').unwrap_or(path));
    }
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

/// Ordered table of reference mounts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    /// Creates a table from configured entries.
    pub fn new(entries: Vec<MountEntry>) -> Self {
        Self { entries }
    }

    /// Number of configured entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Longest-prefix match of `cache_path` against the configured roots.
    pub fn resolve(&self, cache_path: &str) -> Option<&MountEntry> {
        let found = self
            .entries
            .iter()
            .filter(|e| strip_component_prefix(cache_path, &e.cache_root).is_some())
            .max_by_key(|e| e.cache_root.trim_end_matches('/').len());
        trace!(
            path = cache_path,
            mount = found.map(|e| e.name.as_str()),
            "mount resolution"
        );
        found
    }
}
