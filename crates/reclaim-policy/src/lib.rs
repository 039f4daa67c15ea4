#![warn(missing_docs)]

//! ReclaimFS policy subsystem: attribute model, boolean policy expressions,
//! three-valued evaluation, and fileclass resolution.
//!
//! Policy rules are boolean trees of typed comparisons over entry attributes
//! (path, size, owner, timestamps, ...). Evaluation is three-valued: a
//! condition over an attribute the caller has not fetched yet yields
//! `Indeterminate`, never `NoMatch` — callers use the distinction to decide
//! whether to fetch more attributes before making a policy decision.

pub mod attr;
pub mod config;
pub mod error;
pub mod eval;
pub mod expr;
pub mod fileclass;

pub use attr::{AttrKind, AttrMask, EntryAttrs, EntryId, EntryStatus, FileType};
pub use config::{ConfigBlock, ConfigItem};
pub use error::{PolicyError, PolicyResult};
pub use eval::{evaluate, PolicyMatch};
pub use expr::{BoolExpr, CompareOp, Comparison, TypedValue};
pub use fileclass::{Fileclass, FileclassRegistry, SetExpr};
