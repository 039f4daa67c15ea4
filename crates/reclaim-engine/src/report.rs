//! Per-run summary counters.
//!
//! Counters are cumulative for the lifetime of a run and only ever read by
//! delta; nothing here is reset mid-process. The report is what operational
//! tooling prints — formatting is the caller's business.

use reclaim_lifecycle::RemoveReason;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic per-removal-reason counters shared between workers.
#[derive(Debug, Default)]
pub struct RemoveReasonCounters {
    type_mismatch: AtomicU64,
    reference_gone: AtomicU64,
    stale_copy: AtomicU64,
    incomplete_copy: AtomicU64,
}

impl RemoveReasonCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one removal for `reason`.
    pub fn record(&self, reason: RemoveReason) {
        let slot = match reason {
            RemoveReason::TypeMismatch => &self.type_mismatch,
            RemoveReason::ReferenceGone => &self.reference_gone,
            RemoveReason::StaleCopy => &self.stale_copy,
            RemoveReason::IncompleteCopy => &self.incomplete_copy,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-destructive snapshot.
    pub fn snapshot(&self) -> RemoveReasonSnapshot {
        RemoveReasonSnapshot {
            type_mismatch: self.type_mismatch.load(Ordering::Relaxed),
            reference_gone: self.reference_gone.load(Ordering::Relaxed),
            stale_copy: self.stale_copy.load(Ordering::Relaxed),
            incomplete_copy: self.incomplete_copy.load(Ordering::Relaxed),
        }
    }
}

/// Plain snapshot of removal reasons for reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveReasonSnapshot {
    /// Removals because the live type diverged from the record.
    pub type_mismatch: u64,
    /// Removals because the reference copy was gone.
    pub reference_gone: u64,
    /// Removals because the cache copy was authoritatively stale.
    pub stale_copy: u64,
    /// Removals because a copy-in timed out.
    pub incomplete_copy: u64,
}

impl RemoveReasonSnapshot {
    /// Total removals across reasons.
    pub fn total(&self) -> u64 {
        self.type_mismatch + self.reference_gone + self.stale_copy + self.incomplete_copy
    }
}

/// Summary of one policy run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Rows returned by the database listing.
    pub considered: u64,
    /// Rows excluded by the whitelist before dispatch.
    pub whitelisted: u64,
    /// Rows whose target policy definitely did not match at listing time.
    pub prefiltered_out: u64,
    /// Items pushed to the work queue.
    pub dispatched: u64,
    /// Entries removed by workers.
    pub removed: u64,
    /// Entries whose record was updated without filesystem action.
    pub updated: u64,
    /// Entries deliberately kept (recently active, reference gone).
    pub kept: u64,
    /// Entries whose final policy evaluation did not match.
    pub no_match: u64,
    /// Entries skipped (transient races, unresolvable mounts).
    pub skipped: u64,
    /// Entries acknowledged with an error outcome.
    pub errors: u64,
    /// Bytes reclaimed by removals.
    pub bytes_reclaimed: u64,
    /// Removal breakdown by reason.
    pub reasons: RemoveReasonSnapshot,
}
