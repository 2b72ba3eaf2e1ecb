//! Workflow run records and status reporting

use crate::stage::{Stage, StageOutcome, WorkflowDefinition, WorkflowKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Workflow execution status
///
/// Pending → Running → {Completed | Failed | Cancelled}; each terminal state
/// is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Whether the status is final
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Stable string form
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable record of one workflow execution
///
/// Created when a workflow starts and mutated stage-by-stage by the engine.
/// `stages_completed` is always a prefix of the definition's stage list, and
/// `current_stage` while Running is the first stage not yet in that prefix.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub definition: WorkflowDefinition,
    pub symbols: Vec<String>,
    pub status: WorkflowStatus,
    pub current_stage: Option<Stage>,
    pub stages_completed: Vec<Stage>,
    pub results: HashMap<Stage, StageOutcome>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Create a pending run for the given definition
    pub fn new(definition: WorkflowDefinition, symbols: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition,
            symbols,
            status: WorkflowStatus::Pending,
            current_stage: None,
            stages_completed: Vec::new(),
            results: HashMap::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// The workflow kind this run executes
    pub fn kind(&self) -> WorkflowKind {
        self.definition.kind
    }

    /// Seconds between start and completion, if terminal
    pub fn duration_secs(&self) -> Option<f64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Build the externally visible status response
    pub fn report(&self) -> WorkflowStatusReport {
        WorkflowStatusReport {
            workflow_id: self.id,
            workflow_type: self.definition.kind,
            status: self.status,
            current_stage: self.current_stage,
            stages_completed: self.stages_completed.clone(),
            errors: self.errors.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration: self.duration_secs(),
            results_summary: self
                .results
                .iter()
                .map(|(stage, outcome)| (*stage, outcome.success))
                .collect(),
        }
    }
}

/// Externally visible view of one run
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatusReport {
    pub workflow_id: Uuid,
    pub workflow_type: WorkflowKind,
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    pub stages_completed: Vec<Stage>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Per-attempted-stage success flag
    pub results_summary: HashMap<Stage, bool>,
}

/// Aggregate run counts for system status
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WorkflowCounts {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!WorkflowStatus::Pending.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_report_summarizes_outcomes() {
        let mut run = WorkflowRun::new(
            WorkflowDefinition::for_kind(WorkflowKind::Quick),
            vec!["AAPL".to_string()],
        );
        run.status = WorkflowStatus::Completed;
        run.completed_at = Some(run.started_at + chrono::Duration::milliseconds(1500));
        run.stages_completed = vec![Stage::DataCollection];
        run.results
            .insert(Stage::DataCollection, StageOutcome::ok(serde_json::json!({})));
        run.results
            .insert(Stage::LlmProcessing, StageOutcome::failed("unavailable"));
        run.errors.push("Stage llm_processing failed: unavailable".to_string());

        let report = run.report();
        assert_eq!(report.status, WorkflowStatus::Completed);
        assert_eq!(report.duration, Some(1.5));
        assert_eq!(report.results_summary[&Stage::DataCollection], true);
        assert_eq!(report.results_summary[&Stage::LlmProcessing], false);
        assert_eq!(report.errors.len(), 1);
    }
}
