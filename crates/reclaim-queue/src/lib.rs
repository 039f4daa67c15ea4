#![warn(missing_docs)]

//! ReclaimFS bounded work queue.
//!
//! Decouples a single-threaded scan/select phase from a multi-threaded
//! execution phase: one driver thread inserts candidate work items, N worker
//! threads dequeue them, perform the external action, and acknowledge an
//! outcome code plus numeric feedback (bytes reclaimed, entries processed).
//! The driver polls cumulative statistics to know when the run has drained.

pub mod queue;

pub use queue::{QueueError, QueueStats, WorkQueue};
