//! Error types for corr-scheduler

use thiserror::Error;

/// Errors raised by scheduler operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No job with the given id exists in the table
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The recurrence rule could not be interpreted
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The job table could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The dispatcher rejected or failed the job action
    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
