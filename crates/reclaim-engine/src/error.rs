//! Error types for the policy execution engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error variants for policy runs.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No completed inventory pass is recorded; the database cannot be
    /// trusted as a candidate source.
    #[error("no prior full inventory pass recorded in the database")]
    NoPriorScan,

    /// The database collaborator failed.
    #[error("database error: {0}")]
    Db(String),

    /// Queue insertion failed; the run is aborted rather than dropping
    /// candidates silently.
    #[error("work queue error: {0}")]
    Queue(#[from] reclaim_queue::QueueError),

    /// Policy construction failed.
    #[error(transparent)]
    Policy(#[from] reclaim_policy::PolicyError),

    /// The run was aborted by the cancellation flag.
    #[error("run aborted during {phase}")]
    Aborted {
        /// Phase the abort was observed in.
        phase: &'static str,
    },

    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(String),
}
