//! Agent lifecycle state and performance metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Maximum number of recent errors retained per agent
pub const RECENT_ERROR_CAP: usize = 50;

/// Number of recent errors included in a health-check response
pub const HEALTH_RECENT_ERRORS: usize = 5;

/// Agent lifecycle state
///
/// `Idle` is the initial state; `Stopped` is terminal and idempotent to
/// re-enter. `Error` is advisory: the worker loop keeps running after an
/// unexpected loop-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Running,
    Paused,
    Error,
    Stopped,
}

impl AgentState {
    /// Whether the agent counts as healthy for health aggregation
    pub fn is_healthy(self) -> bool {
        matches!(self, Self::Idle | Self::Running)
    }

    /// Stable string form
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent performance counters
///
/// Mutated only by the owning agent's worker loop; queries take a snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentMetrics {
    /// Number of tasks that completed successfully
    pub tasks_completed: u64,
    /// Number of tasks whose handler reported a failure
    pub tasks_failed: u64,
    /// Cumulative handler runtime in seconds
    pub total_runtime_secs: f64,
    /// Rolling average task time in seconds
    pub average_task_time_secs: f64,
    /// Timestamp of the last completed task
    pub last_activity: Option<DateTime<Utc>>,
    /// Bounded log of recent failure descriptions, oldest first
    recent_errors: VecDeque<String>,
}

impl AgentMetrics {
    /// Record a successful task execution
    pub fn record_success(&mut self, elapsed: Duration) {
        self.tasks_completed += 1;
        self.total_runtime_secs += elapsed.as_secs_f64();
        self.average_task_time_secs = self.total_runtime_secs / self.tasks_completed as f64;
        self.last_activity = Some(Utc::now());
    }

    /// Record a failed task execution
    pub fn record_failure(&mut self, description: impl Into<String>) {
        self.tasks_failed += 1;
        self.push_error(description.into());
    }

    /// Append to the bounded recent-error log
    pub fn push_error(&mut self, description: String) {
        if self.recent_errors.len() >= RECENT_ERROR_CAP {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(description);
    }

    /// Total number of errors currently retained
    pub fn error_count(&self) -> usize {
        self.recent_errors.len()
    }

    /// The `n` most recent errors, oldest first
    pub fn recent_errors(&self, n: usize) -> Vec<String> {
        let skip = self.recent_errors.len().saturating_sub(n);
        self.recent_errors.iter().skip(skip).cloned().collect()
    }
}

/// Snapshot of one agent's state and metrics
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatusReport {
    /// Unique agent id
    pub agent_id: String,
    /// Human-readable agent name
    pub name: String,
    /// Lifecycle state at snapshot time
    pub state: AgentState,
    /// Performance counters at snapshot time
    pub metrics: AgentMetrics,
    /// Pending queue depth
    pub queue_size: usize,
    /// Tasks currently executing (0 or 1 per agent)
    pub running_tasks: usize,
}

/// Health-check response for one agent
#[derive(Debug, Clone, Serialize)]
pub struct AgentHealth {
    /// Whether the agent is Idle or Running
    pub healthy: bool,
    /// Lifecycle state at check time (serialized as `status`)
    #[serde(rename = "status")]
    pub state: AgentState,
    /// Timestamp of the last completed task
    pub last_activity: Option<DateTime<Utc>>,
    /// Total number of retained errors
    pub error_count: usize,
    /// The most recent errors, oldest first
    pub recent_errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_health() {
        assert!(AgentState::Idle.is_healthy());
        assert!(AgentState::Running.is_healthy());
        assert!(!AgentState::Paused.is_healthy());
        assert!(!AgentState::Error.is_healthy());
        assert!(!AgentState::Stopped.is_healthy());
    }

    #[test]
    fn test_metrics_average() {
        let mut metrics = AgentMetrics::default();
        metrics.record_success(Duration::from_secs(2));
        metrics.record_success(Duration::from_secs(4));

        assert_eq!(metrics.tasks_completed, 2);
        assert!((metrics.average_task_time_secs - 3.0).abs() < 1e-9);
        assert!(metrics.last_activity.is_some());
    }

    #[test]
    fn test_error_log_bounded() {
        let mut metrics = AgentMetrics::default();
        for i in 0..RECENT_ERROR_CAP + 10 {
            metrics.record_failure(format!("error {i}"));
        }

        assert_eq!(metrics.tasks_failed, (RECENT_ERROR_CAP + 10) as u64);
        assert_eq!(metrics.error_count(), RECENT_ERROR_CAP);

        let recent = metrics.recent_errors(3);
        assert_eq!(
            recent,
            vec![
                format!("error {}", RECENT_ERROR_CAP + 7),
                format!("error {}", RECENT_ERROR_CAP + 8),
                format!("error {}", RECENT_ERROR_CAP + 9),
            ]
        );
    }
}
