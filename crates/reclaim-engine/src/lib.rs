#![warn(missing_docs)]

//! ReclaimFS policy execution engine.
//!
//! Orchestrates a policy run: open a filtered, sorted database listing, push
//! matching candidates through a bounded queue to a fixed pool of worker
//! threads, let each worker re-check the entry against the live filesystem
//! and the lifecycle decision table, and poll cumulative queue statistics
//! until the run drains.

pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod fs;
pub mod report;
pub mod workers;

pub use config::{EngineConfig, MountConfig};
pub use db::{DbFilter, DbSort, EntryDb, MemDb, SortField, LAST_FULL_SCAN};
pub use driver::{PolicyRunner, RunPhase, RunPolicy};
pub use error::{EngineError, EngineResult};
pub use fs::{FsOps, FsStat, MockFs};
pub use report::{RemoveReasonCounters, RunReport};
pub use workers::{ItemKind, Outcome, WorkItem, WorkerCtx, WorkerPool, FB_BYTES, FB_COUNT, FB_WIDTH};
