//! Filesystem collaborator: the external-action surface workers drive.
//!
//! The engine consumes `stat`/`unlink`/`rmdir`/`read_dir` plus the opaque
//! handle↔path lookups of handle-addressed filesystems. [`MockFs`] is a
//! path-keyed in-memory implementation with injectable failures and call
//! counters, used by tests to check that destructive actions run exactly
//! once and races are tolerated.

use parking_lot::Mutex;
use reclaim_lifecycle::RemovalFs;
use reclaim_policy::{EntryId, FileType};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stat-like snapshot of a live filesystem object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FsStat {
    /// File type.
    pub ftype: FileType,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, epoch seconds.
    pub mtime: u64,
    /// Last access time, epoch seconds.
    pub atime: u64,
    /// Link count.
    pub nlink: u32,
}

/// Filesystem operations the engine consumes.
///
/// Extends the walker's removal surface with stat and handle resolution.
pub trait FsOps: RemovalFs + Send + Sync {
    /// Stats a path.
    fn stat(&self, path: &str) -> io::Result<FsStat>;
    /// Resolves an entry handle to its current path.
    fn fid2path(&self, id: EntryId) -> io::Result<String>;
    /// Resolves a path to its entry handle.
    fn path2fid(&self, path: &str) -> io::Result<EntryId>;
    /// Sets the access time of a path (cross-tier atime back-propagation).
    fn set_atime(&self, path: &str, atime: u64) -> io::Result<()>;
}

#[derive(Clone, Debug)]
struct MockNode {
    id: EntryId,
    stat: FsStat,
}

/// In-memory mock filesystem keyed by path.
#[derive(Default)]
pub struct MockFs {
    nodes: Mutex<BTreeMap<String, MockNode>>,
    fail_paths: Mutex<HashSet<String>>,
    unlink_calls: AtomicU64,
    rmdir_calls: AtomicU64,
}

impl MockFs {
    /// Creates an empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node at `path`.
    pub fn add(&self, path: &str, id: EntryId, stat: FsStat) {
        self.nodes
            .lock()
            .insert(path.to_string(), MockNode { id, stat });
    }

    /// Removes a node, simulating an entry vanishing under the engine.
    pub fn vanish(&self, path: &str) {
        self.nodes.lock().remove(path);
    }

    /// Makes destructive operations on `path` fail with `EACCES`.
    pub fn fail_on(&self, path: &str) {
        self.fail_paths.lock().insert(path.to_string());
    }

    /// Whether a node exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.nodes.lock().contains_key(path)
    }

    /// Number of `unlink` calls so far.
    pub fn unlink_calls(&self) -> u64 {
        self.unlink_calls.load(Ordering::Relaxed)
    }

    /// Number of `rmdir` calls so far.
    pub fn rmdir_calls(&self) -> u64 {
        self.rmdir_calls.load(Ordering::Relaxed)
    }

    fn check_fail(&self, path: &str) -> io::Result<()> {
        if self.fail_paths.lock().contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected"));
        }
        Ok(())
    }

    fn child_prefix(path: &str) -> String {
        format!("{}/", path.trim_end_matches('/'))
    }
}

impl RemovalFs for MockFs {
    fn read_dir(&self, path: &str) -> io::Result<Vec<(String, FileType)>> {
        let nodes = self.nodes.lock();
        if !nodes.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
        }
        let prefix = Self::child_prefix(path);
        Ok(nodes
            .iter()
            .filter(|(p, _)| p.starts_with(&prefix) && !p[prefix.len()..].contains('/'))
            .map(|(p, n)| (p[prefix.len()..].to_string(), n.stat.ftype))
            .collect())
    }

    fn unlink(&self, path: &str) -> io::Result<u64> {
        self.unlink_calls.fetch_add(1, Ordering::Relaxed);
        self.check_fail(path)?;
        let mut nodes = self.nodes.lock();
        match nodes.remove(path) {
            Some(node) => Ok(node.stat.size),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }

    fn rmdir(&self, path: &str) -> io::Result<()> {
        self.rmdir_calls.fetch_add(1, Ordering::Relaxed);
        self.check_fail(path)?;
        let mut nodes = self.nodes.lock();
        let prefix = Self::child_prefix(path);
        if nodes.keys().any(|p| p.starts_with(&prefix)) {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                "directory not empty",
            ));
        }
        match nodes.remove(path) {
            Some(node) if node.stat.ftype == FileType::Directory => Ok(()),
            Some(node) => {
                nodes.insert(path.to_string(), node);
                Err(io::Error::new(io::ErrorKind::InvalidInput, "not a directory"))
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such directory")),
        }
    }
}

impl FsOps for MockFs {
    fn stat(&self, path: &str) -> io::Result<FsStat> {
        self.nodes
            .lock()
            .get(path)
            .map(|n| n.stat)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such path"))
    }

    fn fid2path(&self, id: EntryId) -> io::Result<String> {
        self.nodes
            .lock()
            .iter()
            .find(|(_, n)| n.id == id)
            .map(|(p, _)| p.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such handle"))
    }

    fn path2fid(&self, path: &str) -> io::Result<EntryId> {
        self.nodes
            .lock()
            .get(path)
            .map(|n| n.id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such path"))
    }

    fn set_atime(&self, path: &str, atime: u64) -> io::Result<()> {
        match self.nodes.lock().get_mut(path) {
            Some(node) => {
                node.stat.atime = atime;
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such path")),
        }
    }
}
