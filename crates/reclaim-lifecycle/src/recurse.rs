//! Recursive directory removal against a live filesystem.
//!
//! The walk uses an explicit worklist instead of language recursion: memory
//! stays bounded on pathological depths and the abort flag is checked
//! between directories, never mid-unlink. Entries that appear or vanish
//! while the walk runs are tolerated and counted, not fatal.

use crate::error::{LifecycleError, LifecycleResult};
use reclaim_policy::FileType;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Minimal filesystem surface the walker needs. The engine's full
/// filesystem trait extends this one.
pub trait RemovalFs {
    /// Lists direct children of a directory as `(name, type)` pairs.
    fn read_dir(&self, path: &str) -> std::io::Result<Vec<(String, FileType)>>;
    /// Unlinks a non-directory entry.
    fn unlink(&self, path: &str) -> std::io::Result<u64>;
    /// Removes an empty directory.
    fn rmdir(&self, path: &str) -> std::io::Result<()>;
}

/// Counters reported by one removal walk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalStats {
    /// Directories removed.
    pub dirs_removed: u64,
    /// Non-directory entries unlinked.
    pub files_removed: u64,
    /// Bytes reclaimed by unlinks.
    pub bytes_reclaimed: u64,
    /// Per-entry failures tolerated during the walk.
    pub errors: u64,
}

enum Frame {
    /// Expand a directory: list children, queue them, then queue its rmdir.
    Enter(String),
    /// All children processed; remove the directory itself.
    Rmdir(String),
}

/// Depth-first recursive removal driven by an explicit stack.
pub struct RemovalWalker {
    abort: Arc<AtomicBool>,
}

impl RemovalWalker {
    /// Creates a walker observing the given abort flag.
    pub fn new(abort: Arc<AtomicBool>) -> Self {
        Self { abort }
    }

    /// Removes `root` and everything below it.
    ///
    /// Children are deleted before their parent's rmdir. Individual child
    /// failures are counted in `errors` and the walk continues; the final
    /// rmdir of a directory whose children could not all be removed will
    /// then fail and be counted too. Returns [`LifecycleError::Aborted`]
    /// when the abort flag is observed between directories.
    pub fn remove_tree<F: RemovalFs>(&self, fs: &F, root: &str) -> LifecycleResult<RemovalStats> {
        let mut stats = RemovalStats::default();
        let mut stack = vec![Frame::Enter(root.to_string())];

        while let Some(frame) = stack.pop() {
            if self.abort.load(Ordering::Relaxed) {
                return Err(LifecycleError::Aborted {
                    dirs_removed: stats.dirs_removed,
                });
            }
            match frame {
                Frame::Enter(dir) => {
                    let children = match fs.read_dir(&dir) {
                        Ok(c) => c,
                        Err(e) => {
                            warn!(path = %dir, error = %e, "cannot list directory");
                            stats.errors += 1;
                            continue;
                        }
                    };
                    stack.push(Frame::Rmdir(dir.clone()));
                    for (name, ftype) in children {
                        let child = join(&dir, &name);
                        if ftype == FileType::Directory {
                            stack.push(Frame::Enter(child));
                        } else {
                            match fs.unlink(&child) {
                                Ok(bytes) => {
                                    stats.files_removed += 1;
                                    stats.bytes_reclaimed += bytes;
                                }
                                Err(e) => {
                                    warn!(path = %child, error = %e, "unlink failed");
                                    stats.errors += 1;
                                }
                            }
                        }
                    }
                }
                Frame::Rmdir(dir) => match fs.rmdir(&dir) {
                    Ok(()) => {
                        stats.dirs_removed += 1;
                        debug!(path = %dir, "directory removed");
                    }
                    Err(e) => {
                        warn!(path = %dir, error = %e, "rmdir failed");
                        stats.errors += 1;
                    }
                },
            }
        }
        Ok(stats)
    }

    /// Removes a single directory that is expected to be empty.
    ///
    /// No recursion: if the directory gained children since listing, the
    /// rmdir fails and the error is returned for the caller to acknowledge.
    pub fn remove_empty_dir<F: RemovalFs>(&self, fs: &F, path: &str) -> LifecycleResult<()> {
        fs.rmdir(path).map_err(|source| LifecycleError::Io {
            path: path.to_string(),
            source,
        })
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}
