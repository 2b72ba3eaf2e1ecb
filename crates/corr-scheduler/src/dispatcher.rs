//! Job dispatch seam between the scheduler and the rest of the system

use crate::error::SchedulerError;
use crate::job::JobSpec;
use async_trait::async_trait;

/// Executes the action carried by a job spec
///
/// Implemented by the coordinator, which owns the agents, the workflow
/// engine and the registry the specs refer to. The scheduler itself never
/// touches those subsystems directly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Run one job action, returning a result summary for the execution log
    async fn dispatch(&self, spec: &JobSpec) -> Result<serde_json::Value, SchedulerError>;
}
