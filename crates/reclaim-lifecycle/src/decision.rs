//! The entry lifecycle decision table.
//!
//! Compares an entry's recorded attributes with the live state of its cache
//! and reference copies and produces one of four outcomes: remove (with a
//! reason), update-only, skip, or keep. Destructive outcomes are only chosen
//! when no grace window can explain the discrepancy; the caller updates the
//! database before performing any removal, so a crash mid-removal leaves the
//! record consistent with "about to be removed".

use crate::mounts::MountTable;
use crate::tier::{CacheState, CacheView, CopyTimeout, RefView, TierCopy};
use reclaim_policy::{EntryAttrs, EntryStatus, FileType};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Grace-window policy constants. Configuration-driven, not magic numbers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GracePolicy {
    /// Margin during which a cross-tier inconsistency is attributed to
    /// propagation delay rather than a real conflict.
    pub latency_grace_secs: u64,
    /// An entry modified within this window is kept even when its reference
    /// copy is gone.
    pub recent_mod_secs: u64,
    /// Deadline after which an in-flight tier copy counts as timed out.
    pub copy_timeout_secs: u64,
}

impl Default for GracePolicy {
    fn default() -> Self {
        Self {
            latency_grace_secs: 300,
            recent_mod_secs: 3600,
            copy_timeout_secs: 21_600,
        }
    }
}

/// Which tier lost authority in a size-conflict resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierSide {
    /// The cache copy.
    Cache,
    /// The reference copy.
    Reference,
}

/// Reason code attached to a removal decision.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoveReason {
    /// Live file type differs from the recorded one.
    TypeMismatch,
    /// The reference copy is gone and the entry is not recently active.
    ReferenceGone,
    /// The reference copy is authoritatively newer; the cache copy is stale.
    StaleCopy,
    /// A copy into the cache timed out, leaving an incomplete file.
    IncompleteCopy,
}

impl RemoveReason {
    /// All reasons, for sizing per-reason counters.
    pub const ALL: [RemoveReason; 4] = [
        RemoveReason::TypeMismatch,
        RemoveReason::ReferenceGone,
        RemoveReason::StaleCopy,
        RemoveReason::IncompleteCopy,
    ];
}

/// Attribute refresh accompanying an update-only decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// New synchronization status to record.
    pub status: EntryStatus,
    /// Push the newer access time to the other tier (cheap coherence when
    /// both copies already agree).
    pub propagate_atime: bool,
    /// Side whose mtime must no longer count in future comparisons.
    pub invalidate: Option<TierSide>,
}

impl StatusUpdate {
    fn status_only(status: EntryStatus) -> Self {
        Self {
            status,
            propagate_atime: false,
            invalidate: None,
        }
    }
}

/// Final outcome of the lifecycle state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleDecision {
    /// Do nothing; never mutates the database. `fatal` distinguishes an
    /// unrecoverable condition (no mount) from a transient race.
    Skip {
        /// Whether the condition is unrecoverable for this entry.
        fatal: bool,
    },
    /// Keep the entry as is (recently active while its reference is gone).
    Keep,
    /// Write the refreshed attribute set; no filesystem action.
    UpdateOnly(StatusUpdate),
    /// Remove the cache copy and then the database record.
    Remove {
        /// Why the entry is being removed.
        reason: RemoveReason,
    },
}

/// Inputs shared by every decision in a run.
#[derive(Clone, Copy)]
pub struct DecisionCtx<'a> {
    /// Reference mount table.
    pub mounts: &'a MountTable,
    /// Grace-window policy.
    pub grace: GracePolicy,
    /// Current time, epoch seconds.
    pub now: u64,
}

/// Runs the decision table for one entry.
///
/// `attrs` is the record previously stored in the database; `cache` and
/// `reference` are the freshly queried tier views. A timed-out copy-out
/// clears its in-flight marker and re-runs the table exactly once.
pub fn decide(
    ctx: &DecisionCtx<'_>,
    attrs: &EntryAttrs,
    cache: &CacheView,
    reference: &RefView,
) -> LifecycleDecision {
    let Some(path) = attrs.fullpath.as_deref() else {
        // Without a path there is no mount resolution and no safe action.
        return LifecycleDecision::Skip { fatal: true };
    };

    let Some(mount) = ctx.mounts.resolve(path) else {
        debug!(path, "no reference mount matches; unrecoverable skip");
        return LifecycleDecision::Skip { fatal: true };
    };
    if !mount.mounted || matches!(reference, RefView::Unmounted) {
        // Known reference, temporarily unreachable: record uncertainty, do
        // not destroy anything.
        return LifecycleDecision::UpdateOnly(StatusUpdate::status_only(EntryStatus::Unknown));
    }

    let mut view = cache.clone();
    loop {
        let state = view.classify(attrs.ftype);
        debug!(path, ?state, "cache state classified");
        match state {
            CacheState::Missing => {
                // Disappeared between listing and execution; corrected on
                // the next inventory pass.
                return LifecycleDecision::Skip { fatal: false };
            }
            CacheState::WrongType => {
                return LifecycleDecision::Remove {
                    reason: RemoveReason::TypeMismatch,
                };
            }
            CacheState::CopyInTimedOut => {
                return LifecycleDecision::Remove {
                    reason: RemoveReason::IncompleteCopy,
                };
            }
            CacheState::CopyOutTimedOut => {
                // Unlock the stale in-flight marker and recheck once; the
                // cleared marker cannot re-trigger this state, so this is a
                // single retry, not a loop.
                view.timeout = CopyTimeout::None;
                continue;
            }
            CacheState::BeingRead | CacheState::BeingWritten => {
                return LifecycleDecision::UpdateOnly(StatusUpdate::status_only(
                    EntryStatus::TransferInProgress,
                ));
            }
            // Metadata refresh happens through the attribute update that
            // accompanies whatever the up-to-date branch decides.
            CacheState::StaleMetadata | CacheState::UpToDate => {
                let Some(copy) = view.copy.as_ref() else {
                    return LifecycleDecision::Skip { fatal: false };
                };
                return decide_up_to_date(ctx, copy, reference);
            }
        }
    }
}

fn decide_up_to_date(
    ctx: &DecisionCtx<'_>,
    cache: &TierCopy,
    reference: &RefView,
) -> LifecycleDecision {
    let grace = ctx.grace;
    let reference = match reference {
        RefView::Unmounted => {
            return LifecycleDecision::UpdateOnly(StatusUpdate::status_only(EntryStatus::Unknown));
        }
        RefView::Missing => {
            let recently_modified =
                ctx.now.saturating_sub(cache.mtime) <= grace.recent_mod_secs;
            if recently_modified || cache.in_transfer() {
                return LifecycleDecision::Keep;
            }
            return LifecycleDecision::Remove {
                reason: RemoveReason::ReferenceGone,
            };
        }
        RefView::Present(copy) => copy,
    };

    if reference.in_transfer() || cache.in_transfer() {
        return LifecycleDecision::UpdateOnly(StatusUpdate::status_only(
            EntryStatus::TransferInProgress,
        ));
    }

    if cache.ftype != FileType::File {
        // Directories and symlinks carry no payload to compare.
        return LifecycleDecision::UpdateOnly(StatusUpdate::status_only(
            EntryStatus::Synchronized,
        ));
    }

    let cache_mtime = cache.effective_mtime();
    let ref_mtime = reference.effective_mtime();

    if cache_mtime == ref_mtime {
        if cache.size == reference.size {
            return LifecycleDecision::UpdateOnly(StatusUpdate {
                status: EntryStatus::Synchronized,
                propagate_atime: cache.atime != reference.atime,
                invalidate: None,
            });
        }
        // Equal mtime, different size. The larger side is authoritative
        // only once both sides are outside the latency window; inside it we
        // record uncertainty and touch nothing.
        let both_settled = ctx.now.saturating_sub(cache_mtime) > grace.latency_grace_secs;
        let invalidate = if both_settled {
            Some(if cache.size > reference.size {
                TierSide::Reference
            } else {
                TierSide::Cache
            })
        } else {
            None
        };
        return LifecycleDecision::UpdateOnly(StatusUpdate {
            status: EntryStatus::Unknown,
            propagate_atime: false,
            invalidate,
        });
    }

    if cache_mtime > ref_mtime {
        if ctx.now.saturating_sub(cache_mtime) <= grace.latency_grace_secs {
            // The newer cache copy may simply not have propagated yet.
            return LifecycleDecision::UpdateOnly(StatusUpdate::status_only(EntryStatus::Unknown));
        }
        return LifecycleDecision::UpdateOnly(StatusUpdate::status_only(EntryStatus::Modified));
    }

    // Reference is newer.
    if ctx.now.saturating_sub(ref_mtime) <= grace.latency_grace_secs {
        return LifecycleDecision::UpdateOnly(StatusUpdate::status_only(EntryStatus::Unknown));
    }
    LifecycleDecision::Remove {
        reason: RemoveReason::StaleCopy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mounts::MountEntry;

    const NOW: u64 = 1_000_000;

    fn mounts() -> MountTable {
        MountTable::new(vec![
            MountEntry {
                name: "data".into(),
                cache_root: "/fs/data".into(),
                reference_root: "/backing/data".into(),
                mounted: true,
            },
            MountEntry {
                name: "tape".into(),
                cache_root: "/fs/tape".into(),
                reference_root: "/tape".into(),
                mounted: false,
            },
        ])
    }

    fn ctx<'a>(mounts: &'a MountTable) -> DecisionCtx<'a> {
        DecisionCtx {
            mounts,
            grace: GracePolicy {
                latency_grace_secs: 300,
                recent_mod_secs: 3600,
                copy_timeout_secs: 21_600,
            },
            now: NOW,
        }
    }

    fn attrs(path: &str, ftype: FileType) -> EntryAttrs {
        EntryAttrs {
            fullpath: Some(path.into()),
            ftype: Some(ftype),
            ..Default::default()
        }
    }

    fn copy(size: u64, mtime: u64) -> TierCopy {
        TierCopy {
            ftype: FileType::File,
            size,
            mtime,
            atime: mtime,
            being_read: false,
            being_written: false,
            invalidated: false,
        }
    }

    fn cache_of(copy: TierCopy) -> CacheView {
        CacheView {
            copy: Some(copy),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_mount_is_fatal_skip() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/elsewhere/x", FileType::File),
            &cache_of(copy(10, NOW - 10_000)),
            &RefView::Missing,
        );
        assert_eq!(d, LifecycleDecision::Skip { fatal: true });
    }

    #[test]
    fn test_unmounted_reference_updates_to_unknown() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/fs/tape/x", FileType::File),
            &cache_of(copy(10, NOW - 10_000)),
            &RefView::Unmounted,
        );
        assert_eq!(
            d,
            LifecycleDecision::UpdateOnly(StatusUpdate::status_only(EntryStatus::Unknown))
        );
    }

    #[test]
    fn test_wrong_type_removes() {
        let m = mounts();
        let mut c = copy(10, NOW - 10_000);
        c.ftype = FileType::Directory;
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(c),
            &RefView::Present(copy(10, NOW - 10_000)),
        );
        assert_eq!(
            d,
            LifecycleDecision::Remove {
                reason: RemoveReason::TypeMismatch
            }
        );
    }

    #[test]
    fn test_missing_cache_copy_is_transient_skip() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &CacheView::default(),
            &RefView::Present(copy(10, NOW - 10_000)),
        );
        assert_eq!(d, LifecycleDecision::Skip { fatal: false });
    }

    #[test]
    fn test_reference_gone_old_entry_removes() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(copy(10, NOW - 100_000)),
            &RefView::Missing,
        );
        assert_eq!(
            d,
            LifecycleDecision::Remove {
                reason: RemoveReason::ReferenceGone
            }
        );
    }

    #[test]
    fn test_reference_gone_recent_entry_kept() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(copy(10, NOW - 60)),
            &RefView::Missing,
        );
        assert_eq!(d, LifecycleDecision::Keep);
    }

    #[test]
    fn test_reference_gone_in_use_entry_kept() {
        let m = mounts();
        let mut c = copy(10, NOW - 100_000);
        c.being_read = true;
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(c),
            &RefView::Missing,
        );
        // Open copies count as in active use even when old.
        assert_eq!(d, LifecycleDecision::Keep);
    }

    #[test]
    fn test_identical_copies_synchronized() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(copy(4096, NOW - 50_000)),
            &RefView::Present(copy(4096, NOW - 50_000)),
        );
        match d {
            LifecycleDecision::UpdateOnly(u) => {
                assert_eq!(u.status, EntryStatus::Synchronized);
                assert!(!u.propagate_atime);
                assert!(u.invalidate.is_none());
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn test_synchronized_with_atime_propagation() {
        let m = mounts();
        let mut newer_atime = copy(4096, NOW - 50_000);
        newer_atime.atime = NOW - 100;
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(newer_atime),
            &RefView::Present(copy(4096, NOW - 50_000)),
        );
        match d {
            LifecycleDecision::UpdateOnly(u) => {
                assert_eq!(u.status, EntryStatus::Synchronized);
                assert!(u.propagate_atime);
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn test_cache_newer_outside_grace_is_modified() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(copy(4096, NOW - 10_000)),
            &RefView::Present(copy(4096, NOW - 50_000)),
        );
        assert_eq!(
            d,
            LifecycleDecision::UpdateOnly(StatusUpdate::status_only(EntryStatus::Modified))
        );
    }

    #[test]
    fn test_cache_newer_inside_grace_is_unknown() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(copy(4096, NOW - 60)),
            &RefView::Present(copy(4096, NOW - 50_000)),
        );
        assert_eq!(
            d,
            LifecycleDecision::UpdateOnly(StatusUpdate::status_only(EntryStatus::Unknown))
        );
    }

    #[test]
    fn test_reference_newer_outside_grace_removes_stale_copy() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(copy(4096, NOW - 50_000)),
            &RefView::Present(copy(4096, NOW - 10_000)),
        );
        assert_eq!(
            d,
            LifecycleDecision::Remove {
                reason: RemoveReason::StaleCopy
            }
        );
    }

    #[test]
    fn test_reference_newer_inside_grace_never_removes() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(copy(4096, NOW - 50_000)),
            &RefView::Present(copy(4096, NOW - 120)),
        );
        assert_eq!(
            d,
            LifecycleDecision::UpdateOnly(StatusUpdate::status_only(EntryStatus::Unknown))
        );
    }

    #[test]
    fn test_size_conflict_inside_grace_is_unknown_no_invalidation() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(copy(8192, NOW - 60)),
            &RefView::Present(copy(4096, NOW - 60)),
        );
        match d {
            LifecycleDecision::UpdateOnly(u) => {
                assert_eq!(u.status, EntryStatus::Unknown);
                assert!(u.invalidate.is_none());
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn test_size_conflict_outside_grace_invalidates_smaller_side() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(copy(8192, NOW - 10_000)),
            &RefView::Present(copy(4096, NOW - 10_000)),
        );
        match d {
            LifecycleDecision::UpdateOnly(u) => {
                assert_eq!(u.status, EntryStatus::Unknown);
                assert_eq!(u.invalidate, Some(TierSide::Reference));
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn test_invalidated_reference_loses_comparison() {
        let m = mounts();
        let mut stale_ref = copy(4096, NOW - 10_000);
        stale_ref.invalidated = true;
        // Reference mtime is newer on disk, but invalidated; cache wins.
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(copy(8192, NOW - 50_000)),
            &RefView::Present(stale_ref),
        );
        assert_eq!(
            d,
            LifecycleDecision::UpdateOnly(StatusUpdate::status_only(EntryStatus::Modified))
        );
    }

    #[test]
    fn test_transfer_in_progress_never_removes() {
        let m = mounts();
        let mut busy = copy(4096, NOW - 50_000);
        busy.being_written = true;
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &cache_of(busy),
            &RefView::Present(copy(4096, NOW - 10_000)),
        );
        assert_eq!(
            d,
            LifecycleDecision::UpdateOnly(StatusUpdate::status_only(
                EntryStatus::TransferInProgress
            ))
        );
    }

    #[test]
    fn test_copy_in_timeout_removes_incomplete() {
        let m = mounts();
        let view = CacheView {
            copy: Some(copy(10, NOW - 100_000)),
            timeout: CopyTimeout::CopyIn,
            metadata_stale: false,
        };
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &view,
            &RefView::Present(copy(10, NOW - 100_000)),
        );
        assert_eq!(
            d,
            LifecycleDecision::Remove {
                reason: RemoveReason::IncompleteCopy
            }
        );
    }

    #[test]
    fn test_copy_out_timeout_rechecks_once() {
        let m = mounts();
        let view = CacheView {
            copy: Some(copy(4096, NOW - 50_000)),
            timeout: CopyTimeout::CopyOut,
            metadata_stale: false,
        };
        // After clearing the marker, the copies agree.
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &view,
            &RefView::Present(copy(4096, NOW - 50_000)),
        );
        match d {
            LifecycleDecision::UpdateOnly(u) => assert_eq!(u.status, EntryStatus::Synchronized),
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn test_directory_up_to_date_is_synchronized() {
        let m = mounts();
        let mut dir = copy(0, NOW - 50_000);
        dir.ftype = FileType::Directory;
        let mut ref_dir = dir.clone();
        ref_dir.mtime = NOW - 10_000;
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/subdir", FileType::Directory),
            &cache_of(dir),
            &RefView::Present(ref_dir),
        );
        assert_eq!(
            d,
            LifecycleDecision::UpdateOnly(StatusUpdate::status_only(EntryStatus::Synchronized))
        );
    }

    #[test]
    fn test_stale_metadata_falls_through_to_comparison() {
        let m = mounts();
        let view = CacheView {
            copy: Some(copy(4096, NOW - 50_000)),
            timeout: CopyTimeout::None,
            metadata_stale: true,
        };
        let d = decide(
            &ctx(&m),
            &attrs("/fs/data/x", FileType::File),
            &view,
            &RefView::Present(copy(4096, NOW - 50_000)),
        );
        match d {
            LifecycleDecision::UpdateOnly(u) => assert_eq!(u.status, EntryStatus::Synchronized),
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn test_missing_path_is_fatal_skip() {
        let m = mounts();
        let d = decide(
            &ctx(&m),
            &EntryAttrs::default(),
            &cache_of(copy(10, NOW)),
            &RefView::Missing,
        );
        assert_eq!(d, LifecycleDecision::Skip { fatal: true });
    }
}
