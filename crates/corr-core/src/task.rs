//! Task data model
//!
//! A task is a unit of work queued to exactly one agent and consumed exactly
//! once by that agent's worker loop. The payload is a tagged enum so handler
//! dispatch is checked at compile time rather than switching on a runtime
//! `type` string.

use crate::error::TaskError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Task priority levels
///
/// Priority is recorded for reporting and queue inspection but does not
/// reorder the queue: within one agent, due tasks execute in FIFO insertion
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Kind of statistical analysis requested from the analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Correlation,
    Volatility,
    MachineLearning,
    Regime,
    Network,
    Comprehensive,
}

impl AnalysisKind {
    /// Stable string form used in payloads and log lines
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Correlation => "correlation",
            Self::Volatility => "volatility",
            Self::MachineLearning => "machine_learning",
            Self::Regime => "regime",
            Self::Network => "network",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task payload, one variant per task kind
///
/// Serialized with a `type` discriminant so persisted job specs and API
/// payloads stay compatible with the documented wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Collect market data for the given symbols over a trailing window
    CollectData {
        symbols: Vec<String>,
        lookback_days: i64,
    },
    /// Run one analysis kind over the given symbols
    RunAnalysis {
        kind: AnalysisKind,
        symbols: Vec<String>,
    },
    /// Trim agent-local scratch state
    Cleanup,
    /// Execute a persisted scheduled job; `attempt` carries the retry budget
    ExecuteJob { job_id: String, attempt: u32 },
    /// Aggregate health across all registered agents
    HealthCheck,
}

impl TaskPayload {
    /// The `type` discriminant as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CollectData { .. } => "collect_data",
            Self::RunAnalysis { .. } => "run_analysis",
            Self::Cleanup => "cleanup",
            Self::ExecuteJob { .. } => "execute_job",
            Self::HealthCheck => "health_check",
        }
    }
}

/// Outcome delivered to a task's completion callback
#[derive(Debug)]
pub struct TaskReport {
    /// Id of the task that finished
    pub task_id: Uuid,
    /// Task name
    pub name: String,
    /// Handler result: detail on success, classified error on failure
    pub outcome: std::result::Result<serde_json::Value, TaskError>,
    /// Wall-clock execution time
    pub elapsed: Duration,
}

/// A unit of work queued to exactly one agent
#[derive(Debug)]
pub struct Task {
    /// Unique task id
    pub id: Uuid,
    /// Human-readable task name
    pub name: String,
    /// Informational priority (see [`TaskPriority`])
    pub priority: TaskPriority,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Earliest time the task may execute; defaults to `created_at`
    pub scheduled_at: DateTime<Utc>,
    /// What to execute
    pub payload: TaskPayload,
    /// Optional completion callback; fired once with the final outcome
    pub callback: Option<oneshot::Sender<TaskReport>>,
}

impl Task {
    /// Create a task scheduled for immediate execution
    pub fn new(name: impl Into<String>, payload: TaskPayload, priority: TaskPriority) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            priority,
            created_at: now,
            scheduled_at: now,
            payload,
            callback: None,
        }
    }

    /// Defer execution until the given time
    pub fn with_scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = scheduled_at;
        self
    }

    /// Attach a completion callback, returning the receiving half
    pub fn with_callback(mut self) -> (Self, oneshot::Receiver<TaskReport>) {
        let (tx, rx) = oneshot::channel();
        self.callback = Some(tx);
        (self, rx)
    }

    /// Whether the task is due for execution at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }
}

/// Serializable description of a task, used by persisted job specs
///
/// Unlike [`Task`], a spec carries no id, timestamps or callback; it is
/// materialized into a fresh task each time it is dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name
    pub name: String,
    /// What to execute
    pub payload: TaskPayload,
    /// Informational priority
    #[serde(default)]
    pub priority: TaskPriority,
}

impl From<TaskSpec> for Task {
    fn from(spec: TaskSpec) -> Self {
        Task::new(spec.name, spec.payload, spec.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_at_defaults_to_created_at() {
        let task = Task::new("t", TaskPayload::Cleanup, TaskPriority::Low);
        assert_eq!(task.scheduled_at, task.created_at);
        assert!(task.is_due(Utc::now()));
    }

    #[test]
    fn test_future_task_not_due() {
        let task = Task::new("t", TaskPayload::Cleanup, TaskPriority::Low)
            .with_scheduled_at(Utc::now() + chrono::Duration::hours(1));
        assert!(!task.is_due(Utc::now()));
    }

    #[test]
    fn test_payload_type_discriminant() {
        let payload = TaskPayload::RunAnalysis {
            kind: AnalysisKind::Correlation,
            symbols: vec!["AAPL".to_string()],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "run_analysis");
        assert_eq!(json["kind"], "correlation");

        let back: TaskPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_task_spec_round_trip() {
        let spec = TaskSpec {
            name: "Scheduled Collection".to_string(),
            payload: TaskPayload::CollectData {
                symbols: vec!["MSFT".to_string()],
                lookback_days: 30,
            },
            priority: TaskPriority::High,
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: TaskSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);

        let task: Task = back.into();
        assert_eq!(task.priority, TaskPriority::High);
    }

    #[tokio::test]
    async fn test_callback_delivery() {
        let (task, rx) = Task::new("t", TaskPayload::Cleanup, TaskPriority::Medium).with_callback();
        let tx = task.callback.unwrap();
        tx.send(TaskReport {
            task_id: task.id,
            name: task.name.clone(),
            outcome: Ok(serde_json::json!({"cleaned": true})),
            elapsed: Duration::from_millis(5),
        })
        .unwrap();

        let report = rx.await.unwrap();
        assert_eq!(report.task_id, task.id);
        assert!(report.outcome.is_ok());
    }
}
