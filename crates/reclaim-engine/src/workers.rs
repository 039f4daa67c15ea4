//! Worker pool: dequeue, re-check, act, acknowledge.
//!
//! Each worker loops on `queue.get()`, re-reads the entry's live state,
//! evaluates the final policy, runs the lifecycle decision table, performs
//! the external action, and acknowledges an outcome code plus feedback
//! counters. Transient per-entry failures invalidate the database record and
//! never crash the worker. Workers finish their current item before
//! observing shutdown.

use crate::db::EntryDb;
use crate::driver::RunPolicy;
use crate::fs::{FsOps, FsStat};
use crate::report::RemoveReasonCounters;
use reclaim_lifecycle::{
    decide, CacheView, CopyTimeout, DecisionCtx, GracePolicy, LifecycleDecision, MountTable,
    RefView, RemovalWalker, TierCopy, TierSide,
};
use reclaim_policy::{evaluate, EntryAttrs, EntryId, EntryStatus, FileType, PolicyMatch};
use reclaim_queue::WorkQueue;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Policy sub-type tag carried by each work item.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ItemKind {
    /// Tier-synchronization check of a regular file.
    File,
    /// Removal of a directory expected to be empty.
    EmptyDir,
    /// Recursive removal of a whole subtree.
    RecursiveDir,
}

/// One dispatched candidate: entry identity plus the attributes the listing
/// returned. Ownership transfers through the queue to exactly one worker.
#[derive(Clone, Debug)]
pub struct WorkItem {
    /// Entry identity.
    pub id: EntryId,
    /// Attributes as recorded at listing time.
    pub attrs: EntryAttrs,
    /// Policy sub-type.
    pub kind: ItemKind,
}

/// Acknowledgment outcome codes. Discriminants index the queue's outcome
/// counter array.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Outcome {
    /// Entry removed and record deleted.
    Removed = 0,
    /// Record updated, no filesystem action.
    Updated = 1,
    /// Entry deliberately kept.
    Kept = 2,
    /// Final policy evaluation did not match.
    NoMatch = 3,
    /// Skipped (transient race, whitelist, unresolvable mount).
    Skipped = 4,
    /// Transient or external-action error.
    Error = 5,
}

impl Outcome {
    /// Number of outcome codes; sizes the queue's counter array.
    pub const COUNT: usize = 6;
}

/// Feedback accumulator index: entries processed.
pub const FB_COUNT: usize = 0;
/// Feedback accumulator index: bytes reclaimed.
pub const FB_BYTES: usize = 1;
/// Width of the feedback array.
pub const FB_WIDTH: usize = 2;

fn feedback(count: u64, bytes: u64) -> [u64; FB_WIDTH] {
    let mut fb = [0; FB_WIDTH];
    fb[FB_COUNT] = count;
    fb[FB_BYTES] = bytes;
    fb
}

/// Shared, read-only context each worker thread operates with.
pub struct WorkerCtx {
    /// Database collaborator.
    pub db: Arc<dyn EntryDb>,
    /// Filesystem collaborator.
    pub fs: Arc<dyn FsOps>,
    /// Target/whitelist policy for final evaluation.
    pub policy: RunPolicy,
    /// Reference mount table.
    pub mounts: MountTable,
    /// Grace-window policy.
    pub grace: GracePolicy,
    /// Global abort flag; checked between items, never mid-action.
    pub abort: Arc<AtomicBool>,
    /// Per-removal-reason counters for the run report.
    pub reasons: Arc<RemoveReasonCounters>,
    /// Clock, injectable for tests.
    pub clock: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl WorkerCtx {
    fn now(&self) -> u64 {
        (self.clock)()
    }
}

/// Fixed-size pool of OS worker threads draining one queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `count` workers looping on the queue.
    pub fn spawn(count: usize, queue: Arc<WorkQueue<WorkItem>>, ctx: Arc<WorkerCtx>) -> Self {
        let handles = (0..count)
            .map(|idx| {
                let queue = Arc::clone(&queue);
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || worker_loop(idx, &queue, &ctx))
            })
            .collect();
        Self { handles }
    }

    /// Waits for all workers to exit (after the queue is shut down).
    pub fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

fn worker_loop(idx: usize, queue: &WorkQueue<WorkItem>, ctx: &WorkerCtx) {
    debug!(worker = idx, "worker started");
    while let Some(item) = queue.get() {
        let id = item.id;
        let (outcome, feedback) = process_item(ctx, item);
        debug!(worker = idx, entry = %id, ?outcome, "item processed");
        queue.acknowledge(outcome as usize, &feedback);
    }
    debug!(worker = idx, "worker exiting");
}

/// Full handling of one dequeued item. Returns the outcome and feedback.
fn process_item(ctx: &WorkerCtx, item: WorkItem) -> (Outcome, [u64; FB_WIDTH]) {
    let now = ctx.now();

    // Resolve the current path: the recorded one, or handle lookup if the
    // record predates a rename.
    let path = match item.attrs.fullpath.clone() {
        Some(p) => p,
        None => match ctx.fs.fid2path(item.id) {
            Ok(p) => p,
            Err(e) => {
                warn!(entry = %item.id, error = %e, "handle resolution failed");
                return invalidate_and_fail(ctx, item.id);
            }
        },
    };

    let live = match ctx.fs.stat(&path) {
        Ok(s) => s,
        Err(e) => {
            // Disappeared or unreadable since listing: stale record.
            debug!(path, error = %e, "stat failed, invalidating record");
            return invalidate_and_fail(ctx, item.id);
        }
    };

    // Identity check: the path may have been reused by a new object.
    match ctx.fs.path2fid(&path) {
        Ok(fid) if fid == item.id => {}
        Ok(_) | Err(_) => {
            debug!(path, entry = %item.id, "identity mismatch after race");
            return invalidate_and_fail(ctx, item.id);
        }
    }

    // Refreshed attribute set for final evaluation and database updates.
    let mut attrs = item.attrs.clone();
    attrs.merge(&attrs_from_stat(&live));

    if let Some(whitelist) = &ctx.policy.whitelist {
        if evaluate(whitelist, &attrs, now) == PolicyMatch::Match {
            debug!(path, "whitelisted, skipping");
            return (Outcome::Skipped, feedback(0, 0));
        }
    }
    match evaluate(&ctx.policy.target, &attrs, now) {
        PolicyMatch::Match => {}
        PolicyMatch::NoMatch => return (Outcome::NoMatch, feedback(0, 0)),
        PolicyMatch::Indeterminate => {
            // Still undecidable with fresh attributes; leave the entry for
            // the next pass rather than guessing.
            debug!(path, "policy indeterminate after refresh");
            return (Outcome::NoMatch, feedback(0, 0));
        }
    }

    match item.kind {
        ItemKind::File => process_file(ctx, &item, &path, &live, attrs, now),
        ItemKind::EmptyDir => process_dir(ctx, &item, &path, attrs, DirRemoval::Empty),
        ItemKind::RecursiveDir => process_dir(ctx, &item, &path, attrs, DirRemoval::Recursive),
    }
}

/// Tier-synchronization handling of a regular-file entry.
fn process_file(
    ctx: &WorkerCtx,
    item: &WorkItem,
    path: &str,
    live: &FsStat,
    attrs: EntryAttrs,
    now: u64,
) -> (Outcome, [u64; FB_WIDTH]) {
    let cache_view = build_cache_view(ctx, item, live, now);
    let (ref_view, ref_path) = build_ref_view(ctx, item, path, live);

    let dctx = DecisionCtx {
        mounts: &ctx.mounts,
        grace: ctx.grace,
        now,
    };
    let decision = decide(&dctx, &item.attrs, &cache_view, &ref_view);
    debug!(path, ?decision, "lifecycle decision");

    match decision {
        LifecycleDecision::Skip { .. } => (Outcome::Skipped, feedback(0, 0)),
        LifecycleDecision::Keep => (Outcome::Kept, feedback(1, 0)),
        LifecycleDecision::UpdateOnly(update) => {
            let mut attrs = attrs;
            attrs.status = Some(update.status);
            match update.invalidate {
                Some(TierSide::Cache) => {
                    // The cache side lost authority; flag the record so the
                    // next inventory pass re-resolves it.
                    if ctx.db.invalidate(item.id).is_err() {
                        return (Outcome::Error, feedback(0, 0));
                    }
                    return (Outcome::Updated, feedback(1, 0));
                }
                Some(TierSide::Reference) => {
                    // The reference side lost authority; persist the marker
                    // so later runs ignore its mtime until the copies agree.
                    attrs.ref_invalidated = Some(true);
                }
                None => {
                    if update.status == EntryStatus::Synchronized {
                        attrs.ref_invalidated = Some(false);
                    }
                }
            }
            if update.propagate_atime {
                propagate_atime(ctx, path, live, ref_path.as_deref(), &ref_view);
            }
            match ctx.db.update_attrs(item.id, &attrs) {
                Ok(()) => (Outcome::Updated, feedback(1, 0)),
                Err(e) => {
                    warn!(path, error = %e, "attribute update failed");
                    (Outcome::Error, feedback(0, 0))
                }
            }
        }
        LifecycleDecision::Remove { reason } => {
            // Record reality before destroying anything: a crash here
            // leaves "about to be removed", never a dangling record.
            let mut attrs = attrs;
            attrs.status = Some(EntryStatus::Unknown);
            if let Err(e) = ctx.db.update_attrs(item.id, &attrs) {
                warn!(path, error = %e, "pre-removal update failed");
                return (Outcome::Error, feedback(0, 0));
            }
            match ctx.fs.unlink(path) {
                Ok(bytes) => {
                    let last_link = live.nlink <= 1;
                    if let Err(e) = ctx.db.remove_entry(item.id, last_link) {
                        warn!(path, error = %e, "record removal failed after unlink");
                        return (Outcome::Error, feedback(1, bytes));
                    }
                    ctx.reasons.record(reason);
                    info!(path, ?reason, bytes, "entry removed");
                    (Outcome::Removed, feedback(1, bytes))
                }
                Err(e) => {
                    warn!(path, error = %e, "unlink failed");
                    reconcile_after_failure(ctx, item.id, path);
                    (Outcome::Error, feedback(0, 0))
                }
            }
        }
    }
}

/// Directory-removal mode, narrowed from [`ItemKind`] at dispatch so the
/// removal path cannot be reached with a file item.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DirRemoval {
    Empty,
    Recursive,
}

/// Directory-removal handling: re-check emptiness (or walk the subtree),
/// then remove the directory and its record.
fn process_dir(
    ctx: &WorkerCtx,
    item: &WorkItem,
    path: &str,
    attrs: EntryAttrs,
    mode: DirRemoval,
) -> (Outcome, [u64; FB_WIDTH]) {
    if mode == DirRemoval::Empty {
        match ctx.fs.read_dir(path) {
            Ok(children) if !children.is_empty() => {
                // Legitimately repopulated between listing and execution.
                debug!(path, children = children.len(), "directory no longer empty");
                return (Outcome::NoMatch, feedback(0, 0));
            }
            Ok(_) => {}
            Err(_) => return invalidate_and_fail(ctx, item.id),
        }
    }

    if let Err(e) = ctx.db.update_attrs(item.id, &attrs) {
        warn!(path, error = %e, "pre-removal update failed");
        return (Outcome::Error, feedback(0, 0));
    }

    let walker = RemovalWalker::new(Arc::clone(&ctx.abort));
    let (result, bytes) = match mode {
        DirRemoval::Empty => (walker.remove_empty_dir(&FsRef(ctx.fs.as_ref()), path), 0),
        DirRemoval::Recursive => match walker.remove_tree(&FsRef(ctx.fs.as_ref()), path) {
            Ok(stats) if stats.errors == 0 => (Ok(()), stats.bytes_reclaimed),
            Ok(stats) => {
                warn!(path, errors = stats.errors, "subtree removal incomplete");
                reconcile_after_failure(ctx, item.id, path);
                return (Outcome::Error, feedback(0, stats.bytes_reclaimed));
            }
            Err(e) => {
                warn!(path, error = %e, "subtree removal aborted");
                return (Outcome::Error, feedback(0, 0));
            }
        },
    };

    match result {
        Ok(()) => {
            if let Err(e) = ctx.db.remove_entry(item.id, true) {
                warn!(path, error = %e, "record removal failed after rmdir");
                return (Outcome::Error, feedback(1, bytes));
            }
            info!(path, "directory removed");
            (Outcome::Removed, feedback(1, bytes))
        }
        Err(e) => {
            debug!(path, error = %e, "rmdir failed");
            reconcile_after_failure(ctx, item.id, path);
            (Outcome::Error, feedback(0, 0))
        }
    }
}

/// Adapter lending `&dyn FsOps` to the walker's generic bound.
struct FsRef<'a>(&'a dyn FsOps);

impl reclaim_lifecycle::RemovalFs for FsRef<'_> {
    fn read_dir(&self, path: &str) -> io::Result<Vec<(String, FileType)>> {
        self.0.read_dir(path)
    }
    fn unlink(&self, path: &str) -> io::Result<u64> {
        self.0.unlink(path)
    }
    fn rmdir(&self, path: &str) -> io::Result<()> {
        self.0.rmdir(path)
    }
}

fn attrs_from_stat(stat: &FsStat) -> EntryAttrs {
    EntryAttrs {
        ftype: Some(stat.ftype),
        size: Some(stat.size),
        last_mod: Some(stat.mtime),
        last_access: Some(stat.atime),
        ..Default::default()
    }
}

/// Builds the cache-side view, deriving transfer and timeout markers from
/// the recorded status and the transfer's age.
fn build_cache_view(ctx: &WorkerCtx, item: &WorkItem, live: &FsStat, now: u64) -> CacheView {
    let mut copy = TierCopy {
        ftype: live.ftype,
        size: live.size,
        mtime: live.mtime,
        atime: live.atime,
        being_read: false,
        being_written: false,
        invalidated: false,
    };
    let mut timeout = CopyTimeout::None;

    if item.attrs.status == Some(EntryStatus::TransferInProgress) {
        let started = item.attrs.last_mod.unwrap_or(live.mtime);
        if now.saturating_sub(started) <= ctx.grace.copy_timeout_secs {
            copy.being_written = true;
        } else {
            // The transfer deadline passed. A short cache copy means the
            // restore never finished; otherwise the stale marker belongs to
            // an archiving pass.
            timeout = CopyTimeout::CopyOut;
            if let Some(recorded) = item.attrs.size {
                if live.size < recorded {
                    timeout = CopyTimeout::CopyIn;
                }
            }
        }
    }

    CacheView {
        copy: Some(copy),
        timeout,
        metadata_stale: false,
    }
}

fn build_ref_view(
    ctx: &WorkerCtx,
    item: &WorkItem,
    path: &str,
    live: &FsStat,
) -> (RefView, Option<String>) {
    let Some(mount) = ctx.mounts.resolve(path) else {
        return (RefView::Missing, None);
    };
    if !mount.mounted {
        return (RefView::Unmounted, None);
    }
    let Some(ref_path) = mount.reference_path(path) else {
        return (RefView::Missing, None);
    };
    match ctx.fs.stat(&ref_path) {
        Ok(s) => {
            // A recorded lost-authority marker holds only while the size
            // conflict that produced it is still visible.
            let lost_authority =
                item.attrs.ref_invalidated == Some(true) && s.size != live.size;
            (
                RefView::Present(TierCopy {
                    ftype: s.ftype,
                    size: s.size,
                    mtime: s.mtime,
                    atime: s.atime,
                    being_read: false,
                    being_written: false,
                    invalidated: lost_authority,
                }),
                Some(ref_path),
            )
        }
        Err(_) => (RefView::Missing, Some(ref_path)),
    }
}

/// Pushes the newer access time to the tier holding the older one.
fn propagate_atime(
    ctx: &WorkerCtx,
    cache_path: &str,
    live: &FsStat,
    ref_path: Option<&str>,
    ref_view: &RefView,
) {
    let (RefView::Present(reference), Some(ref_path)) = (ref_view, ref_path) else {
        return;
    };
    let result = if live.atime > reference.atime {
        ctx.fs.set_atime(ref_path, live.atime)
    } else {
        ctx.fs.set_atime(cache_path, reference.atime)
    };
    if let Err(e) = result {
        debug!(cache_path, error = %e, "atime propagation failed");
    }
}

/// Transient-error path: flag the record for the next inventory pass and
/// acknowledge an error outcome. Never panics the worker.
fn invalidate_and_fail(ctx: &WorkerCtx, id: EntryId) -> (Outcome, [u64; FB_WIDTH]) {
    if let Err(e) = ctx.db.invalidate(id) {
        warn!(entry = %id, error = %e, "record invalidation failed");
    }
    (Outcome::Error, feedback(0, 0))
}

/// After a failed external action, update the record to current reality so
/// the database never silently assumes the action happened.
fn reconcile_after_failure(ctx: &WorkerCtx, id: EntryId, path: &str) {
    match ctx.fs.stat(path) {
        Ok(stat) => {
            let attrs = attrs_from_stat(&stat);
            if let Err(e) = ctx.db.update_attrs(id, &attrs) {
                warn!(path, error = %e, "post-failure reconcile failed");
            }
        }
        Err(_) => {
            if let Err(e) = ctx.db.invalidate(id) {
                warn!(path, error = %e, "post-failure invalidation failed");
            }
        }
    }
}
