//! Workflow engine: bounded-concurrency run execution
//!
//! `start_workflow` returns a run id immediately; the stages execute on a
//! spawned task gated by a semaphore sized to the configured maximum
//! concurrency. Runs are independent of one another; shared collaborators
//! behind the stage runner are not serialized by this layer.

use crate::error::WorkflowError;
use crate::run::{WorkflowCounts, WorkflowRun, WorkflowStatus, WorkflowStatusReport};
use crate::stage::{Stage, StageOutcome, WorkflowDefinition, WorkflowKind};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Executes one stage against the agents and collaborators
///
/// Implemented by the coordinator, which maps each stage onto the data
/// source, store and analysis service.
#[async_trait::async_trait]
pub trait StageRunner: Send + Sync {
    /// Run a single stage, returning its outcome
    async fn run_stage(&self, stage: Stage, ctx: &StageContext) -> StageOutcome;
}

/// Per-stage execution context handed to the runner
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Id of the owning run
    pub workflow_id: Uuid,
    /// Symbols the run operates on
    pub symbols: Vec<String>,
    /// Caller-supplied parameters
    pub params: serde_json::Value,
    /// Stages completed so far in this run
    pub stages_completed: Vec<Stage>,
}

/// Registry and executor for workflow runs
pub struct WorkflowEngine {
    runner: Arc<dyn StageRunner>,
    runs: Arc<RwLock<HashMap<Uuid, WorkflowRun>>>,
    permits: Arc<Semaphore>,
}

impl WorkflowEngine {
    /// Create an engine with a bounded worker pool
    pub fn new(runner: Arc<dyn StageRunner>, max_concurrent_workflows: usize) -> Self {
        Self {
            runner,
            runs: Arc::new(RwLock::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent_workflows.max(1))),
        }
    }

    /// Start a workflow of the given kind; returns the run id immediately
    pub fn start_workflow(
        &self,
        symbols: Vec<String>,
        kind: WorkflowKind,
        params: serde_json::Value,
    ) -> Uuid {
        self.start_with_definition(symbols, WorkflowDefinition::for_kind(kind), params)
    }

    /// Start a workflow over an explicit stage list
    pub fn start_with_definition(
        &self,
        symbols: Vec<String>,
        definition: WorkflowDefinition,
        params: serde_json::Value,
    ) -> Uuid {
        let run = WorkflowRun::new(definition, symbols.clone());
        let id = run.id;
        info!(workflow = %id, kind = %run.kind(), ?symbols, "Workflow started");

        self.runs.write().unwrap().insert(id, run);

        let runner = self.runner.clone();
        let runs = self.runs.clone();
        let permits = self.permits.clone();
        tokio::spawn(async move {
            // Semaphore is never closed; acquire cannot fail.
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            execute_run(runner, runs, id, params).await;
        });

        id
    }

    /// Mark a pending or running workflow as cancelled
    ///
    /// The executor observes the status between stages and stops without
    /// rolling back completed stages.
    pub fn cancel_workflow(&self, id: Uuid) -> Result<(), WorkflowError> {
        let mut runs = self.runs.write().unwrap();
        let run = runs
            .get_mut(&id)
            .ok_or(WorkflowError::UnknownWorkflow(id))?;

        if run.status.is_terminal() {
            return Err(WorkflowError::AlreadyTerminal {
                id,
                status: run.status,
            });
        }

        run.status = WorkflowStatus::Cancelled;
        run.current_stage = None;
        run.completed_at = Some(chrono::Utc::now());
        warn!(workflow = %id, "Workflow cancelled");
        Ok(())
    }

    /// Status response for one run
    pub fn workflow_status(&self, id: Uuid) -> Option<WorkflowStatusReport> {
        self.runs.read().unwrap().get(&id).map(WorkflowRun::report)
    }

    /// Status responses for every known run
    pub fn list_runs(&self) -> Vec<WorkflowStatusReport> {
        self.runs
            .read()
            .unwrap()
            .values()
            .map(WorkflowRun::report)
            .collect()
    }

    /// Aggregate counts for system status
    pub fn counts(&self) -> WorkflowCounts {
        let runs = self.runs.read().unwrap();
        let mut counts = WorkflowCounts {
            total: runs.len(),
            ..WorkflowCounts::default()
        };
        for run in runs.values() {
            match run.status {
                WorkflowStatus::Pending | WorkflowStatus::Running => counts.active += 1,
                WorkflowStatus::Completed => counts.completed += 1,
                WorkflowStatus::Failed => counts.failed += 1,
                WorkflowStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}

/// Drive one run through its stage list
async fn execute_run(
    runner: Arc<dyn StageRunner>,
    runs: Arc<RwLock<HashMap<Uuid, WorkflowRun>>>,
    id: Uuid,
    params: serde_json::Value,
) {
    // Transition Pending → Running, unless cancelled while queued.
    let stages = {
        let mut guard = runs.write().unwrap();
        let Some(run) = guard.get_mut(&id) else {
            return;
        };
        if run.status != WorkflowStatus::Pending {
            return;
        }
        run.status = WorkflowStatus::Running;
        run.definition.stages.clone()
    };

    for spec in stages {
        // Observe cancellation between stages; set current_stage before the
        // stage begins.
        let ctx = {
            let mut guard = runs.write().unwrap();
            let Some(run) = guard.get_mut(&id) else {
                return;
            };
            if run.status != WorkflowStatus::Running {
                return;
            }
            run.current_stage = Some(spec.stage);
            StageContext {
                workflow_id: id,
                symbols: run.symbols.clone(),
                params: params.clone(),
                stages_completed: run.stages_completed.clone(),
            }
        };

        info!(workflow = %id, stage = %spec.stage, "Executing stage");
        let outcome = runner.run_stage(spec.stage, &ctx).await;

        let mut guard = runs.write().unwrap();
        let Some(run) = guard.get_mut(&id) else {
            return;
        };
        if run.status != WorkflowStatus::Running {
            // Cancelled mid-stage; keep whatever completed, drop the rest.
            return;
        }

        if outcome.success {
            run.stages_completed.push(spec.stage);
            run.results.insert(spec.stage, outcome);
            // Cleared under the same lock so no status query ever sees a
            // completed stage as still current.
            run.current_stage = None;
            info!(workflow = %id, stage = %spec.stage, "Stage completed");
        } else {
            let reason = outcome
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            run.errors
                .push(format!("Stage {} failed: {reason}", spec.stage));
            run.results.insert(spec.stage, outcome);

            if spec.critical {
                error!(workflow = %id, stage = %spec.stage, %reason, "Critical stage failed");
                run.status = WorkflowStatus::Failed;
                run.current_stage = None;
                run.completed_at = Some(chrono::Utc::now());
                return;
            }
            run.current_stage = None;
            warn!(
                workflow = %id,
                stage = %spec.stage,
                %reason,
                "Continuing despite non-critical stage failure"
            );
        }
    }

    let mut guard = runs.write().unwrap();
    if let Some(run) = guard.get_mut(&id) {
        if run.status == WorkflowStatus::Running {
            run.status = WorkflowStatus::Completed;
            run.current_stage = None;
            run.completed_at = Some(chrono::Utc::now());
            info!(
                workflow = %id,
                duration_secs = run.duration_secs().unwrap_or_default(),
                "Workflow completed"
            );
        }
    }
}
