//! Error types for the lifecycle subsystem.

use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Error variants for lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Wraps filesystem I/O errors from the external-action collaborator.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The path the operation was applied to.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The removal walker was aborted by the cancellation flag.
    #[error("removal aborted after {dirs_removed} directories")]
    Aborted {
        /// Directories removed before the abort was observed.
        dirs_removed: u64,
    },
}
