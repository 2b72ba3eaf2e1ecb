//! Task handler trait implemented by each agent kind

use async_trait::async_trait;
use corr_core::{Task, TaskError};

/// Result of one handler invocation: detail on success, classified error on
/// failure. Expected failures travel through this value; the worker loop
/// branches on it instead of unwinding.
pub type TaskOutput = std::result::Result<serde_json::Value, TaskError>;

/// Agent-specific task execution logic
///
/// One handler instance backs one agent. The worker loop calls `handle`
/// synchronously for each due task; a slow handler delays every subsequent
/// task queued to the same agent.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Get the handler's name (used in logs and error attribution)
    fn name(&self) -> &str;

    /// Execute a single task
    async fn handle(&self, task: &Task) -> TaskOutput;
}
