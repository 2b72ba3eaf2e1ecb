//! Error types for corr-core

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error type for engine-wide failures
///
/// Every failure in the engine is contained at the boundary of the unit that
/// produced it and recorded as state on that unit; these variants classify
/// the failure for logging and for status queries.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Component configuration was invalid at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A task handler reported a failure
    #[error("Task execution failed: {0}")]
    TaskExecution(#[from] TaskError),

    /// A message bus subscriber failed to process a message
    #[error("Communication error: {0}")]
    Communication(String),

    /// The backing store rejected a read or write
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Lookup of an agent by id or name failed
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Generic error message
    #[error("{0}")]
    Other(String),
}

/// Failure reported by a task handler
///
/// Handlers return this instead of panicking; the worker loop counts the
/// failure, appends it to the agent's recent-error log and keeps running.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// An external collaborator (data source, analysis service) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// No data was available for the requested symbols
    #[error("No data available: {0}")]
    NoData(String),

    /// The payload kind is not handled by this agent
    #[error("Agent {agent} does not handle this task kind")]
    Unsupported {
        /// Name of the agent that received the task
        agent: String,
    },

    /// Generic task failure
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TaskError::NoData("AAPL".to_string());
        assert_eq!(err.to_string(), "No data available: AAPL");

        let err = TaskError::Unsupported {
            agent: "data-collector".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Agent data-collector does not handle this task kind"
        );
    }

    #[test]
    fn test_task_error_conversion() {
        let task_err = TaskError::Collaborator("timeout".to_string());
        let core_err: CoreError = task_err.into();

        match core_err {
            CoreError::TaskExecution(inner) => {
                assert!(inner.to_string().contains("timeout"));
            }
            _ => panic!("Expected TaskExecution variant"),
        }
    }
}
