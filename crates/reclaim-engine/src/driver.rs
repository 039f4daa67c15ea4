//! Policy run orchestration.
//!
//! A run moves through four phases: check the database is trustworthy
//! (a full inventory pass has completed), list candidates with a coarse
//! database-side filter, dispatch them through the bounded queue to the
//! worker pool, then poll cumulative queue statistics until everything
//! dispatched has been acknowledged. The final report is computed from
//! counter deltas, never from resetting anything.

use crate::config::EngineConfig;
use crate::db::{DbFilter, EntryDb, LAST_FULL_SCAN};
use crate::error::{EngineError, EngineResult};
use crate::fs::FsOps;
use crate::report::{RemoveReasonCounters, RunReport};
use crate::workers::{ItemKind, Outcome, WorkItem, WorkerCtx, WorkerPool, FB_BYTES, FB_WIDTH};
use parking_lot::Mutex;
use reclaim_policy::{evaluate, BoolExpr, Comparison, FileType, PolicyMatch};
use reclaim_queue::WorkQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// One runnable policy: what to act on, what to leave alone, and how.
#[derive(Clone)]
pub struct RunPolicy {
    /// Entries matching this expression are acted on.
    pub target: Arc<BoolExpr>,
    /// Entries matching this expression are never touched, even when the
    /// target matches.
    pub whitelist: Option<Arc<BoolExpr>>,
    /// Action sub-type for dispatched items.
    pub kind: ItemKind,
}

/// Phase a runner is currently in, for status reporting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// No run in progress.
    Idle,
    /// Querying the database for candidates.
    Listing,
    /// Pushing candidates into the work queue.
    Dispatching,
    /// Waiting for workers to acknowledge everything dispatched.
    Draining,
}

/// Executes one policy against the database and filesystem collaborators.
pub struct PolicyRunner {
    config: EngineConfig,
    db: Arc<dyn EntryDb>,
    fs: Arc<dyn FsOps>,
    policy: RunPolicy,
    abort: Arc<AtomicBool>,
    phase: Mutex<RunPhase>,
    clock: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl PolicyRunner {
    /// Creates a runner over the given collaborators, using the wall clock.
    pub fn new(
        config: EngineConfig,
        db: Arc<dyn EntryDb>,
        fs: Arc<dyn FsOps>,
        policy: RunPolicy,
    ) -> Self {
        Self::with_clock(config, db, fs, policy, Arc::new(wall_clock))
    }

    /// Creates a runner with an injected clock, for tests.
    pub fn with_clock(
        config: EngineConfig,
        db: Arc<dyn EntryDb>,
        fs: Arc<dyn FsOps>,
        policy: RunPolicy,
        clock: Arc<dyn Fn() -> u64 + Send + Sync>,
    ) -> Self {
        Self {
            config,
            db,
            fs,
            policy,
            abort: Arc::new(AtomicBool::new(false)),
            phase: Mutex::new(RunPhase::Idle),
            clock,
        }
    }

    /// Cancellation flag shared with workers; set it to stop the run at the
    /// next safe point.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Current phase.
    pub fn phase(&self) -> RunPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: RunPhase) {
        *self.phase.lock() = phase;
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Runs the policy to completion and returns the run report.
    ///
    /// Fails with [`EngineError::NoPriorScan`] when the database has never
    /// seen a complete inventory pass, and with [`EngineError::Aborted`]
    /// when the cancellation flag is raised mid-run. An abort still drains
    /// in-flight items before returning.
    pub fn run(&self) -> EngineResult<RunReport> {
        let now = (self.clock)();

        // A database without a completed inventory pass lists a partial
        // world; acting on it would remove entries that merely were not
        // scanned yet.
        if self.db.get_var(LAST_FULL_SCAN)?.is_none() {
            return Err(EngineError::NoPriorScan);
        }

        self.set_phase(RunPhase::Listing);
        let filter = DbFilter {
            not_invalid: true,
            ftype: Some(match self.policy.kind {
                ItemKind::File => FileType::File,
                ItemKind::EmptyDir | ItemKind::RecursiveDir => FileType::Directory,
            }),
            conditions: simple_conditions(&self.policy.target),
        };
        let rows = self.db.list(&filter, &self.config.sort, now)?;
        info!(candidates = rows.len(), "listing complete");

        let queue = Arc::new(WorkQueue::new(
            self.config.queue_capacity,
            Outcome::COUNT,
            FB_WIDTH,
        ));
        let reasons = Arc::new(RemoveReasonCounters::new());
        let ctx = Arc::new(WorkerCtx {
            db: Arc::clone(&self.db),
            fs: Arc::clone(&self.fs),
            policy: self.policy.clone(),
            mounts: self.config.mount_table(),
            grace: self.config.grace,
            abort: Arc::clone(&self.abort),
            reasons: Arc::clone(&reasons),
            clock: Arc::clone(&self.clock),
        });
        let pool = WorkerPool::spawn(self.config.worker_threads, Arc::clone(&queue), ctx);

        self.set_phase(RunPhase::Dispatching);
        let mut report = RunReport {
            considered: rows.len() as u64,
            ..Default::default()
        };
        let dispatch_result = self.dispatch(rows, &queue, &mut report, now);

        self.set_phase(RunPhase::Draining);
        let drained = self.drain(&queue, report.dispatched);

        queue.shutdown();
        pool.join();
        self.set_phase(RunPhase::Idle);

        let stats = queue.stats();
        report.removed = stats.outcomes[Outcome::Removed as usize];
        report.updated = stats.outcomes[Outcome::Updated as usize];
        report.kept = stats.outcomes[Outcome::Kept as usize];
        report.no_match = stats.outcomes[Outcome::NoMatch as usize];
        report.skipped = stats.outcomes[Outcome::Skipped as usize];
        report.errors = stats.outcomes[Outcome::Error as usize];
        report.bytes_reclaimed = stats.feedback[FB_BYTES];
        report.reasons = reasons.snapshot();

        dispatch_result?;
        drained?;
        info!(
            removed = report.removed,
            updated = report.updated,
            errors = report.errors,
            bytes = report.bytes_reclaimed,
            "run complete"
        );
        Ok(report)
    }

    fn dispatch(
        &self,
        rows: Vec<(reclaim_policy::EntryId, reclaim_policy::EntryAttrs)>,
        queue: &WorkQueue<WorkItem>,
        report: &mut RunReport,
        now: u64,
    ) -> EngineResult<()> {
        for (id, attrs) in rows {
            if self.aborted() {
                warn!("abort observed during dispatch");
                return Err(EngineError::Aborted { phase: "dispatch" });
            }
            if let Some(whitelist) = &self.policy.whitelist {
                if evaluate(whitelist, &attrs, now) == PolicyMatch::Match {
                    report.whitelisted += 1;
                    continue;
                }
            }
            // Indeterminate rows are dispatched: the worker refreshes the
            // attributes and re-evaluates with complete information.
            if evaluate(&self.policy.target, &attrs, now) == PolicyMatch::NoMatch {
                report.prefiltered_out += 1;
                continue;
            }
            queue.insert(WorkItem {
                id,
                attrs,
                kind: self.policy.kind,
            })?;
            report.dispatched += 1;
        }
        debug!(dispatched = report.dispatched, "dispatch complete");
        Ok(())
    }

    fn drain(&self, queue: &WorkQueue<WorkItem>, dispatched: u64) -> EngineResult<()> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            let stats = queue.stats();
            if stats.total_acked() >= dispatched && stats.queued == 0 && stats.in_flight == 0 {
                return Ok(());
            }
            if self.aborted() {
                // Let workers finish what they already claimed, then stop.
                queue.shutdown();
                warn!(
                    acked = stats.total_acked(),
                    dispatched, "abort observed during drain"
                );
                return Err(EngineError::Aborted { phase: "drain" });
            }
            std::thread::sleep(interval);
        }
    }
}

fn wall_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Collects the condition leaves reachable through top-level conjunctions.
///
/// Only `And` chains and bare conditions qualify: a condition under `Or` or
/// `Not` is not individually necessary, so pushing it into the database
/// filter would wrongly exclude rows.
pub fn simple_conditions(expr: &BoolExpr) -> Vec<Comparison> {
    let mut out = Vec::new();
    collect_conjuncts(expr, &mut out);
    out
}

fn collect_conjuncts(expr: &BoolExpr, out: &mut Vec<Comparison>) {
    match expr {
        BoolExpr::Condition(cmp) => out.push(cmp.clone()),
        BoolExpr::And(a, b) => {
            collect_conjuncts(a, out);
            collect_conjuncts(b, out);
        }
        BoolExpr::Or(..) | BoolExpr::Not(..) => {}
    }
}
