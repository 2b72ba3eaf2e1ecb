//! Error types for corr-workflow

use crate::run::WorkflowStatus;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by workflow registry operations
///
/// Stage failures are not errors at this level; they are data on the run
/// (its error list and status).
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No run with the given id is known
    #[error("Workflow not found: {0}")]
    UnknownWorkflow(Uuid),

    /// The run already reached a terminal status
    #[error("Workflow {id} is already terminal ({status})")]
    AlreadyTerminal { id: Uuid, status: WorkflowStatus },
}
