//! Error types for drover.
//!
//! Uses thiserror for derive macros and keeps every message user-actionable:
//! nothing here ever carries a raw backtrace to the caller.

use crate::exit_codes;
use crate::provider::ErrorClassification;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for drover operations.
///
/// Each variant maps to an exit code. `Cancelled` is a control-flow signal
/// rather than a failure: the orchestrator routes it to the `interrupted`
/// status and never counts it against the auto-pause tracker.
#[derive(Error, Debug)]
pub enum DroverError {
    /// User provided invalid arguments or the system is in an invalid state.
    #[error("{0}")]
    UserError(String),

    /// Configuration file could not be read or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The feature store has no record of this feature.
    #[error("feature '{0}' not found")]
    FeatureNotFound(String),

    /// The resolved working directory does not exist or is not a directory.
    #[error("working directory '{}' does not exist or is not a directory", .0.display())]
    InvalidWorkingDirectory(PathBuf),

    /// Another execution already holds this feature's concurrency slot.
    #[error("feature '{0}' is already running")]
    AlreadyRunning(String),

    /// The execution was cancelled before it finished.
    #[error("execution cancelled")]
    Cancelled,

    /// The agent process failed; carries the classified error.
    #[error("{}", .0.message)]
    Agent(ErrorClassification),

    /// The agent binary could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A post-execution pipeline step failed.
    #[error("pipeline step failed: {0}")]
    Pipeline(String),

    /// Auto mode is paused after repeated failures of the same kind.
    #[error("auto mode is paused: {0}")]
    AutoPaused(String),
}

impl DroverError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            DroverError::UserError(_)
            | DroverError::Config(_)
            | DroverError::FeatureNotFound(_)
            | DroverError::InvalidWorkingDirectory(_) => exit_codes::USER_ERROR,
            DroverError::AlreadyRunning(_) => exit_codes::ALREADY_RUNNING,
            DroverError::Cancelled => exit_codes::INTERRUPTED,
            DroverError::Agent(_)
            | DroverError::Spawn { .. }
            | DroverError::Pipeline(_)
            | DroverError::AutoPaused(_) => exit_codes::AGENT_FAILURE,
        }
    }

    /// Whether this error is the cancellation signal rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DroverError::Cancelled)
    }
}

/// Result type alias for drover operations.
pub type Result<T> = std::result::Result<T, DroverError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ErrorKind;

    #[test]
    fn user_errors_map_to_user_exit_code() {
        assert_eq!(
            DroverError::UserError("bad argument".to_string()).exit_code(),
            exit_codes::USER_ERROR
        );
        assert_eq!(
            DroverError::FeatureNotFound("f-1".to_string()).exit_code(),
            exit_codes::USER_ERROR
        );
        assert_eq!(
            DroverError::InvalidWorkingDirectory(PathBuf::from("/nope")).exit_code(),
            exit_codes::USER_ERROR
        );
    }

    #[test]
    fn already_running_has_its_own_exit_code() {
        let err = DroverError::AlreadyRunning("f-1".to_string());
        assert_eq!(err.exit_code(), exit_codes::ALREADY_RUNNING);
        assert_eq!(err.to_string(), "feature 'f-1' is already running");
    }

    #[test]
    fn cancellation_is_not_a_failure_exit() {
        let err = DroverError::Cancelled;
        assert!(err.is_cancellation());
        assert_eq!(err.exit_code(), exit_codes::INTERRUPTED);
    }

    #[test]
    fn agent_error_displays_classified_message() {
        let err = DroverError::Agent(ErrorClassification {
            kind: ErrorKind::RateLimited,
            message: "rate limit reached".to_string(),
            recoverable: true,
            suggestion: Some("wait".to_string()),
        });
        assert_eq!(err.to_string(), "rate limit reached");
        assert_eq!(err.exit_code(), exit_codes::AGENT_FAILURE);
        assert!(!err.is_cancellation());
    }
}
