//! End-to-end policy runs against in-memory collaborators.
//!
//! Each scenario wires a [`PolicyRunner`] to a seeded `MemDb` and `MockFs`
//! and checks the externally visible effects of a whole run: what was
//! removed, what was merely re-recorded, and what the report says happened.
//!
//! [`PolicyRunner`]: reclaim_engine::PolicyRunner
