#![warn(missing_docs)]

//! ReclaimFS entry lifecycle subsystem.
//!
//! Given an entry's recorded state and the live state of its cache and
//! reference tier copies, decide one of a fixed set of outcomes: remove
//! (with a reason), update the record only, skip, or keep. The decision
//! table is deliberately biased toward keeping data: any discrepancy that
//! could be explained by asynchronous propagation between tiers degrades to
//! an "unknown" status instead of a destructive action.

pub mod decision;
pub mod error;
pub mod mounts;
pub mod recurse;
pub mod tier;

pub use decision::{
    decide, DecisionCtx, GracePolicy, LifecycleDecision, RemoveReason, StatusUpdate, TierSide,
};
pub use error::{LifecycleError, LifecycleResult};
pub use mounts::{MountEntry, MountTable};
pub use recurse::{RemovalFs, RemovalStats, RemovalWalker};
pub use tier::{CacheState, CacheView, CopyTimeout, RefView, TierCopy};
