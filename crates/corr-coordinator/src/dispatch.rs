//! Scheduled-job dispatch against the running system

use async_trait::async_trait;
use corr_runtime::AgentRegistry;
use corr_scheduler::{JobDispatcher, JobSpec, SchedulerError};
use corr_workflow::{WorkflowEngine, WorkflowKind};
use std::sync::Arc;
use tracing::debug;

/// `JobDispatcher` backed by the coordinator's registry and workflow engine
pub struct CoordinatorDispatcher {
    registry: Arc<AgentRegistry>,
    engine: Arc<WorkflowEngine>,
}

impl CoordinatorDispatcher {
    pub fn new(registry: Arc<AgentRegistry>, engine: Arc<WorkflowEngine>) -> Self {
        Self { registry, engine }
    }
}

#[async_trait]
impl JobDispatcher for CoordinatorDispatcher {
    async fn dispatch(&self, spec: &JobSpec) -> Result<serde_json::Value, SchedulerError> {
        match spec {
            JobSpec::AgentTask { agent_id, task } => {
                let agent = self.registry.get(agent_id).ok_or_else(|| {
                    SchedulerError::Dispatch(format!("Unknown agent: {agent_id}"))
                })?;
                let task_id = agent.create_task(
                    task.name.clone(),
                    task.payload.clone(),
                    task.priority,
                    None,
                );
                debug!(agent = %agent_id, task = %task_id, "Scheduled task dispatched");
                Ok(serde_json::json!({ "task_id": task_id }))
            }
            JobSpec::Workflow {
                workflow_type,
                symbols,
            } => {
                let kind = WorkflowKind::parse(workflow_type);
                let workflow_id =
                    self.engine
                        .start_workflow(symbols.clone(), kind, serde_json::json!({}));
                Ok(serde_json::json!({ "workflow_id": workflow_id }))
            }
            JobSpec::HealthCheck => {
                let health = self.registry.health_check_all();
                let healthy = health.values().filter(|h| h.healthy).count();
                Ok(serde_json::json!({
                    "agents": health.len(),
                    "healthy": healthy,
                }))
            }
        }
    }
}
