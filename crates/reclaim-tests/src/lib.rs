#![warn(missing_docs)]

//! ReclaimFS cross-crate test suite.
//!
//! Unit tests live next to the code they cover; this crate holds the tests
//! that cut across crate boundaries: algebraic laws of three-valued policy
//! evaluation, the configuration-to-evaluation pipeline, queue behavior
//! under thread contention, grace-window bias of the lifecycle decision
//! table, and whole policy runs against in-memory collaborators.

pub mod grace_window;
pub mod policy_pipeline;
pub mod queue_stress;
pub mod scenarios;
pub mod three_valued;
