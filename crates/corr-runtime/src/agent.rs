//! Per-agent worker loop and lifecycle state machine
//!
//! Each agent owns one FIFO queue and at most one live worker loop. The loop
//! wakes on enqueue, skips not-yet-due tasks by requeuing them at the tail
//! (bounded by the poll interval), and runs the agent's handler synchronously
//! for each due task. A failing task never stops the agent.

use crate::handler::TaskHandler;
use crate::queue::TaskQueue;
use chrono::{DateTime, Utc};
use corr_core::{
    AgentHealth, AgentMetrics, AgentState, AgentStatusReport, Task, TaskError, TaskPayload,
    TaskPriority, TaskReport, state::HEALTH_RECENT_ERRORS,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for an agent's worker loop
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Retry interval while paused or while the queue head is not yet due
    pub poll_interval: Duration,

    /// How long `stop` waits for the worker to finish its in-flight task
    pub join_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// An independent worker owning one task queue and one lifecycle state machine
///
/// State machine: Idle →(start)→ Running ⇄(pause/resume)⇄ Paused;
/// Running/Paused →(stop)→ Stopped. Stopped is terminal for the current
/// worker and idempotent to re-enter; a stopped agent may be started again,
/// which spawns a fresh worker over the same queue and metrics.
pub struct AgentRuntime {
    shared: Arc<WorkerShared>,
    control: tokio::sync::Mutex<WorkerControl>,
    config: AgentConfig,
}

struct WorkerControl {
    token: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

struct WorkerShared {
    agent_id: String,
    name: String,
    handler: Arc<dyn TaskHandler>,
    queue: Arc<TaskQueue>,
    state: RwLock<AgentState>,
    metrics: RwLock<AgentMetrics>,
    running_tasks: AtomicUsize,
    poll_interval: Duration,
}

impl AgentRuntime {
    /// Create a new agent with its own queue
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
        config: AgentConfig,
    ) -> Self {
        Self::with_queue(agent_id, name, handler, config, Arc::new(TaskQueue::new()))
    }

    /// Create a new agent over an externally owned queue
    ///
    /// Used when the handler needs to enqueue follow-up tasks on its own
    /// agent (the scheduler schedules its retries this way).
    pub fn with_queue(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
        config: AgentConfig,
        queue: Arc<TaskQueue>,
    ) -> Self {
        let agent_id = agent_id.into();
        let name = name.into();
        info!(agent = %name, id = %agent_id, "Agent initialized");
        Self {
            shared: Arc::new(WorkerShared {
                agent_id,
                name,
                handler,
                queue,
                state: RwLock::new(AgentState::Idle),
                metrics: RwLock::new(AgentMetrics::default()),
                running_tasks: AtomicUsize::new(0),
                poll_interval: config.poll_interval,
            }),
            control: tokio::sync::Mutex::new(WorkerControl {
                token: CancellationToken::new(),
                worker: None,
            }),
            config,
        }
    }

    /// Get the agent's unique id
    pub fn agent_id(&self) -> &str {
        &self.shared.agent_id
    }

    /// Get the agent's human-readable name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Get the agent's task queue
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.shared.queue
    }

    /// Current lifecycle state
    pub fn state(&self) -> AgentState {
        *self.shared.state.read().unwrap()
    }

    /// Enqueue an existing task; ownership transfers to this agent
    pub fn add_task(&self, task: Task) {
        debug!(
            agent = %self.shared.name,
            task = %task.name,
            priority = ?task.priority,
            "Task added"
        );
        self.shared.queue.push(task);
    }

    /// Create and enqueue a new task, returning its id
    pub fn create_task(
        &self,
        name: impl Into<String>,
        payload: TaskPayload,
        priority: TaskPriority,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Uuid {
        let mut task = Task::new(name, payload, priority);
        if let Some(at) = scheduled_at {
            task = task.with_scheduled_at(at);
        }
        let id = task.id;
        self.add_task(task);
        id
    }

    /// Start the worker loop
    ///
    /// A no-op (with a warning) unless the agent is Idle or Stopped; an agent
    /// has at most one live worker.
    pub async fn start(&self) {
        let mut control = self.control.lock().await;

        let state = self.state();
        if !matches!(state, AgentState::Idle | AgentState::Stopped) {
            warn!(agent = %self.shared.name, %state, "Agent already running");
            return;
        }

        control.token = CancellationToken::new();
        *self.shared.state.write().unwrap() = AgentState::Running;

        let shared = self.shared.clone();
        let token = control.token.clone();
        control.worker = Some(tokio::spawn(run_worker(shared, token)));

        info!(agent = %self.shared.name, "Agent started");
    }

    /// Stop the worker loop
    ///
    /// Sets the shared cancellation flag and joins the worker with a bounded
    /// timeout; the in-flight task is not interrupted. Safe to call
    /// repeatedly and before `start`.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;

        *self.shared.state.write().unwrap() = AgentState::Stopped;
        control.token.cancel();

        if let Some(worker) = control.worker.take() {
            if tokio::time::timeout(self.config.join_timeout, worker)
                .await
                .is_err()
            {
                warn!(
                    agent = %self.shared.name,
                    "Worker did not finish within join timeout"
                );
            }
        }

        info!(agent = %self.shared.name, "Agent stopped");
    }

    /// Pause task execution; queued tasks stay queued
    pub fn pause(&self) {
        let mut state = self.shared.state.write().unwrap();
        if *state == AgentState::Running {
            *state = AgentState::Paused;
            info!(agent = %self.shared.name, "Agent paused");
        }
    }

    /// Resume a paused agent
    pub fn resume(&self) {
        let mut state = self.shared.state.write().unwrap();
        if *state == AgentState::Paused {
            *state = AgentState::Running;
            info!(agent = %self.shared.name, "Agent resumed");
        }
    }

    /// Snapshot of state, metrics and queue depth
    pub fn status(&self) -> AgentStatusReport {
        AgentStatusReport {
            agent_id: self.shared.agent_id.clone(),
            name: self.shared.name.clone(),
            state: self.state(),
            metrics: self.shared.metrics.read().unwrap().clone(),
            queue_size: self.shared.queue.len(),
            running_tasks: self.shared.running_tasks.load(Ordering::SeqCst),
        }
    }

    /// Health check: healthy while Idle or Running
    pub fn health_check(&self) -> AgentHealth {
        let state = self.state();
        let metrics = self.shared.metrics.read().unwrap();
        AgentHealth {
            healthy: state.is_healthy(),
            state,
            last_activity: metrics.last_activity,
            error_count: metrics.error_count(),
            recent_errors: metrics.recent_errors(HEALTH_RECENT_ERRORS),
        }
    }
}

/// The worker loop
///
/// Pops the FIFO head; a head whose `scheduled_at` is still in the future is
/// requeued at the tail and retried after the poll interval, which can delay
/// later, already-due tasks by at most that interval.
async fn run_worker(shared: Arc<WorkerShared>, token: CancellationToken) {
    info!(agent = %shared.name, "Worker loop started");

    loop {
        if token.is_cancelled() {
            break;
        }

        if *shared.state.read().unwrap() == AgentState::Paused {
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(shared.poll_interval) => {}
            }
            continue;
        }

        match shared.queue.pop() {
            None => {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = shared.queue.notified() => {}
                }
            }
            Some(task) if !task.is_due(Utc::now()) => {
                shared.queue.requeue(task);
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(shared.poll_interval) => {}
                }
            }
            Some(task) => shared.execute(task).await,
        }
    }

    info!(agent = %shared.name, "Worker loop stopped");
}

impl WorkerShared {
    /// Execute one task and fold the outcome into the metrics
    ///
    /// Handler failures are contained here: counted, logged, delivered to the
    /// callback, and the loop moves on. A panicking handler additionally sets
    /// the advisory Error state without stopping the loop.
    async fn execute(&self, mut task: Task) {
        self.running_tasks.store(1, Ordering::SeqCst);
        let start = Instant::now();
        info!(agent = %self.name, task = %task.name, "Executing task");

        let callback = task.callback.take();
        let outcome = match AssertUnwindSafe(self.handler.handle(&task))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                // Advisory only; a concurrent stop() already owns the state.
                let mut state = self.state.write().unwrap();
                if matches!(*state, AgentState::Running | AgentState::Paused) {
                    *state = AgentState::Error;
                }
                drop(state);
                Err(TaskError::Other(format!(
                    "handler panicked while executing {}",
                    task.name
                )))
            }
        };

        let elapsed = start.elapsed();
        match &outcome {
            Ok(_) => {
                self.metrics.write().unwrap().record_success(elapsed);
                info!(
                    agent = %self.name,
                    task = %task.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Task completed"
                );
            }
            Err(e) => {
                self.metrics
                    .write()
                    .unwrap()
                    .record_failure(format!("Task {}: {e}", task.name));
                warn!(agent = %self.name, task = %task.name, error = %e, "Task failed");
            }
        }

        if let Some(tx) = callback {
            // The receiver may have been dropped; that is not an error.
            let _ = tx.send(TaskReport {
                task_id: task.id,
                name: task.name,
                outcome,
                elapsed,
            });
        }

        self.running_tasks.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records execution order and timing; fails tasks named "bad"
    struct RecordingHandler {
        log: Mutex<Vec<(String, DateTime<Utc>)>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                log: Mutex::new(Vec::new()),
            })
        }

        fn names(&self) -> Vec<String> {
            self.log.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
        }
    }

    #[async_trait]
    impl TaskHandler for RecordingHandler {
        fn name(&self) -> &str {
            "recording"
        }

        async fn handle(&self, task: &Task) -> crate::handler::TaskOutput {
            self.log.lock().unwrap().push((task.name.clone(), Utc::now()));
            if task.name == "bad" {
                return Err(TaskError::Other("induced failure".to_string()));
            }
            Ok(serde_json::json!({"done": task.name}))
        }
    }

    fn fast_config() -> AgentConfig {
        AgentConfig {
            poll_interval: Duration::from_millis(20),
            join_timeout: Duration::from_secs(2),
        }
    }

    fn cleanup_task(name: &str, priority: TaskPriority) -> Task {
        Task::new(name, TaskPayload::Cleanup, priority)
    }

    #[tokio::test]
    async fn test_fifo_order_ignores_priority() {
        let handler = RecordingHandler::new();
        let agent = AgentRuntime::new("a-1", "Test Agent", handler.clone(), fast_config());

        agent.add_task(cleanup_task("low", TaskPriority::Low));
        agent.add_task(cleanup_task("high", TaskPriority::High));
        let (last, rx) = cleanup_task("medium", TaskPriority::Medium).with_callback();
        agent.add_task(last);

        agent.start().await;
        rx.await.unwrap();
        agent.stop().await;

        assert_eq!(handler.names(), vec!["low", "high", "medium"]);
    }

    #[tokio::test]
    async fn test_failure_counted_and_loop_continues() {
        let handler = RecordingHandler::new();
        let agent = AgentRuntime::new("a-2", "Test Agent", handler.clone(), fast_config());

        agent.add_task(cleanup_task("bad", TaskPriority::Medium));
        let (good, rx) = cleanup_task("good", TaskPriority::Medium).with_callback();
        agent.add_task(good);

        agent.start().await;
        let report = rx.await.unwrap();
        assert!(report.outcome.is_ok());

        let status = agent.status();
        assert_eq!(status.metrics.tasks_completed, 1);
        assert_eq!(status.metrics.tasks_failed, 1);
        assert_eq!(status.metrics.error_count(), 1);
        // A failing task never stops the agent
        assert_eq!(status.state, AgentState::Running);

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_no_execution_before_scheduled_at() {
        let handler = RecordingHandler::new();
        let agent = AgentRuntime::new("a-3", "Test Agent", handler.clone(), fast_config());

        let scheduled_at = Utc::now() + chrono::Duration::milliseconds(150);
        let (task, rx) = cleanup_task("deferred", TaskPriority::Medium)
            .with_scheduled_at(scheduled_at)
            .with_callback();
        agent.add_task(task);

        agent.start().await;
        rx.await.unwrap();
        agent.stop().await;

        let log = handler.log.lock().unwrap();
        let (_, executed_at) = &log[0];
        assert!(*executed_at >= scheduled_at);
    }

    #[tokio::test]
    async fn test_future_head_delays_but_does_not_block() {
        let handler = RecordingHandler::new();
        let agent = AgentRuntime::new("a-4", "Test Agent", handler.clone(), fast_config());

        // Far-future head; the due task behind it must still run once the
        // loop requeues the head and reaches it.
        agent.add_task(
            cleanup_task("future", TaskPriority::Medium)
                .with_scheduled_at(Utc::now() + chrono::Duration::hours(1)),
        );
        let (due, rx) = cleanup_task("due", TaskPriority::Medium).with_callback();
        agent.add_task(due);

        agent.start().await;
        let report = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("due task should run despite far-future head")
            .unwrap();
        assert_eq!(report.name, "due");
        agent.stop().await;

        assert_eq!(handler.names(), vec!["due"]);
        // The future task is still queued, unconsumed
        assert_eq!(agent.status().queue_size, 1);
    }

    #[tokio::test]
    async fn test_double_stop_is_noop() {
        let agent =
            AgentRuntime::new("a-5", "Test Agent", RecordingHandler::new(), fast_config());

        agent.start().await;
        agent.stop().await;
        agent.stop().await;
        assert_eq!(agent.state(), AgentState::Stopped);

        // Stop before start is equally harmless
        let idle = AgentRuntime::new("a-6", "Idle", RecordingHandler::new(), fast_config());
        idle.stop().await;
        assert_eq!(idle.state(), AgentState::Stopped);
    }

    #[tokio::test]
    async fn test_pause_defers_execution() {
        let handler = RecordingHandler::new();
        let agent = AgentRuntime::new("a-7", "Test Agent", handler.clone(), fast_config());

        agent.start().await;
        agent.pause();
        assert_eq!(agent.state(), AgentState::Paused);

        let (task, rx) = cleanup_task("after-resume", TaskPriority::Medium).with_callback();
        agent.add_task(task);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(agent.status().metrics.tasks_completed, 0);

        agent.resume();
        rx.await.unwrap();
        agent.stop().await;

        assert_eq!(handler.names(), vec!["after-resume"]);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let handler = RecordingHandler::new();
        let agent = AgentRuntime::new("a-8", "Test Agent", handler.clone(), fast_config());

        agent.start().await;
        agent.stop().await;

        agent.start().await;
        assert_eq!(agent.state(), AgentState::Running);

        let (task, rx) = cleanup_task("post-restart", TaskPriority::Medium).with_callback();
        agent.add_task(task);
        rx.await.unwrap();
        agent.stop().await;

        assert_eq!(handler.names(), vec!["post-restart"]);
    }

    /// Waits on the gate (when set), then panics
    struct PanickingHandler {
        gate: Option<Arc<tokio::sync::Notify>>,
    }

    #[async_trait]
    impl TaskHandler for PanickingHandler {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn handle(&self, _task: &Task) -> crate::handler::TaskOutput {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            panic!("induced panic");
        }
    }

    #[tokio::test]
    async fn test_panic_sets_error_state_and_loop_continues() {
        let agent = AgentRuntime::new(
            "a-10",
            "Test Agent",
            Arc::new(PanickingHandler { gate: None }),
            fast_config(),
        );

        let (task, rx) = cleanup_task("boom", TaskPriority::Medium).with_callback();
        agent.add_task(task);
        agent.start().await;

        let report = rx.await.unwrap();
        assert!(report.outcome.is_err());
        assert_eq!(agent.state(), AgentState::Error);
        assert_eq!(agent.status().metrics.tasks_failed, 1);

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_panic_does_not_overwrite_stopped_state() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let agent = Arc::new(AgentRuntime::new(
            "a-11",
            "Test Agent",
            Arc::new(PanickingHandler {
                gate: Some(gate.clone()),
            }),
            fast_config(),
        ));

        agent.add_task(cleanup_task("boom", TaskPriority::Medium));
        agent.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Stop while the task is in flight; it writes Stopped, then waits on
        // the join. The panic lands afterwards and must leave Stopped alone.
        let stopper = agent.clone();
        let stop_handle = tokio::spawn(async move { stopper.stop().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_one();
        stop_handle.await.unwrap();

        assert_eq!(agent.state(), AgentState::Stopped);
        assert_eq!(agent.status().metrics.tasks_failed, 1);
    }

    #[tokio::test]
    async fn test_health_check_reflects_errors() {
        let agent =
            AgentRuntime::new("a-9", "Test Agent", RecordingHandler::new(), fast_config());

        let (task, rx) = cleanup_task("bad", TaskPriority::Medium).with_callback();
        agent.add_task(task);
        agent.start().await;
        let report = rx.await.unwrap();
        assert!(report.outcome.is_err());

        let health = agent.health_check();
        assert!(health.healthy); // Running counts as healthy
        assert_eq!(health.error_count, 1);
        assert_eq!(health.recent_errors.len(), 1);

        agent.stop().await;
        assert!(!agent.health_check().healthy);
    }
}
