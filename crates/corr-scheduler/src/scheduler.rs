//! Scheduler tick loop, job execution and retry

use crate::dispatcher::JobDispatcher;
use crate::error::SchedulerError;
use crate::job::{JobSpec, JobTable, ScheduleSpec, ScheduledJob};
use crate::store::JobStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corr_core::{MessageType, Task, TaskError, TaskPayload, TaskPriority};
use corr_runtime::{AgentConfig, AgentRuntime, MessageBus, TaskHandler, TaskOutput, TaskQueue};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Id the scheduler's own execution agent runs under
pub const SCHEDULER_AGENT_ID: &str = "scheduler-agent-001";

/// Maximum number of execution records retained in the history log
pub const JOB_HISTORY_CAP: usize = 100;

/// Execution records included in a status summary
const STATUS_RECENT_EXECUTIONS: usize = 5;

/// Scheduler tuning knobs
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the tick loop scans for due jobs
    pub tick_interval: Duration,

    /// Cap on jobs executing or queued at once; due triggers beyond the cap
    /// are deferred to the next tick
    pub max_concurrent_jobs: usize,

    /// Retries granted to each execution chain after its first failure
    pub retry_attempts: u32,

    /// Fixed delay before a retry executes
    pub retry_delay: Duration,

    /// Worker-loop configuration for the scheduler's own agent
    pub agent: AgentConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            max_concurrent_jobs: 5,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(60),
            agent: AgentConfig::default(),
        }
    }
}

/// One completed job execution, success or failure
#[derive(Debug, Clone, Serialize)]
pub struct JobExecution {
    pub job_id: String,
    pub job_name: String,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Point-in-time scheduler summary
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub total_jobs: usize,
    pub enabled_jobs: usize,
    /// Jobs currently executing
    pub in_flight: usize,
    /// Execution tasks waiting on the scheduler agent's queue
    pub queued: usize,
    /// Earliest upcoming firing time across enabled jobs
    pub next_run: Option<DateTime<Utc>>,
    /// Execution records currently retained
    pub history_len: usize,
    /// Most recent executions, oldest first
    pub recent_executions: Vec<JobExecution>,
}

/// Cron-like scheduler with a persistent job table
///
/// The scheduler is itself an agent: due jobs become `ExecuteJob` tasks on
/// its own queue, so execution inherits the worker loop's metrics, panic
/// containment and FIFO semantics.
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    agent: Arc<AgentRuntime>,
    ticker: tokio::sync::Mutex<TickerControl>,
    config: SchedulerConfig,
}

struct TickerControl {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Where to announce job completions and failures
struct JobEvents {
    bus: Arc<MessageBus>,
    recipient: String,
}

struct SchedulerShared {
    table: Mutex<JobTable>,
    store: Arc<dyn JobStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    queue: Arc<TaskQueue>,
    in_flight: AtomicUsize,
    history: Mutex<VecDeque<JobExecution>>,
    events: Option<JobEvents>,
    retry_attempts: u32,
    retry_delay: chrono::Duration,
}

impl Scheduler {
    /// Create a scheduler over the given store and dispatcher
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self::build(store, dispatcher, config, None)
    }

    /// Create a scheduler that announces job outcomes on the bus
    ///
    /// Each execution publishes a `JobCompleted` or `JobFailed` message
    /// addressed to `recipient`.
    pub fn with_bus(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        config: SchedulerConfig,
        bus: Arc<MessageBus>,
        recipient: impl Into<String>,
    ) -> Self {
        Self::build(
            store,
            dispatcher,
            config,
            Some(JobEvents {
                bus,
                recipient: recipient.into(),
            }),
        )
    }

    fn build(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        config: SchedulerConfig,
        events: Option<JobEvents>,
    ) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let shared = Arc::new(SchedulerShared {
            table: Mutex::new(JobTable::default()),
            store,
            dispatcher,
            queue: queue.clone(),
            in_flight: AtomicUsize::new(0),
            history: Mutex::new(VecDeque::new()),
            events,
            retry_attempts: config.retry_attempts,
            retry_delay: chrono::Duration::from_std(config.retry_delay)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        });
        let handler = Arc::new(JobExecutionHandler {
            shared: shared.clone(),
        });
        let agent = Arc::new(AgentRuntime::with_queue(
            SCHEDULER_AGENT_ID,
            "SchedulerAgent",
            handler,
            config.agent.clone(),
            queue,
        ));
        Self {
            shared,
            agent,
            ticker: tokio::sync::Mutex::new(TickerControl {
                token: CancellationToken::new(),
                handle: None,
            }),
            config,
        }
    }

    /// The scheduler's own agent, for status reporting
    pub fn agent(&self) -> &Arc<AgentRuntime> {
        &self.agent
    }

    /// Load the persisted table, start the execution agent and the tick loop
    ///
    /// Restoring the table re-arms `next_run` for every enabled job from the
    /// current time; disabled jobs stay listed but inert. A persisted job
    /// whose schedule no longer validates is disabled with a warning.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut ticker = self.ticker.lock().await;
        if ticker.handle.is_some() {
            warn!("Scheduler already running");
            return Ok(());
        }

        if let Some(mut restored) = self.shared.store.load().await? {
            let now = Utc::now();
            for job in restored.jobs.values_mut() {
                if !job.enabled {
                    job.next_run = None;
                    continue;
                }
                match job.schedule.next_run_after(now) {
                    Ok(next) => job.next_run = Some(next),
                    Err(err) => {
                        warn!(job = %job.job_name, id = %job.job_id, error = %err,
                            "Disabling job with invalid schedule");
                        job.enabled = false;
                        job.next_run = None;
                    }
                }
            }
            info!(
                jobs = restored.jobs.len(),
                counter = restored.job_counter,
                "Job table restored"
            );
            *self.shared.table.lock().unwrap() = restored;
        }

        self.agent.start().await;

        ticker.token = CancellationToken::new();
        let token = ticker.token.clone();
        let shared = self.shared.clone();
        let tick_interval = self.config.tick_interval;
        let max_concurrent = self.config.max_concurrent_jobs;
        ticker.handle = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(tick_interval) => shared.tick(max_concurrent).await,
                }
            }
        }));

        info!("Scheduler started");
        Ok(())
    }

    /// Stop the tick loop and the execution agent, then persist the table
    pub async fn stop(&self) {
        {
            let mut ticker = self.ticker.lock().await;
            ticker.token.cancel();
            if let Some(handle) = ticker.handle.take() {
                let _ = handle.await;
            }
        }
        self.agent.stop().await;
        if let Err(err) = self.shared.persist().await {
            error!(error = %err, "Failed to persist job table at shutdown");
        }
        info!("Scheduler stopped");
    }

    /// Add a job to the table, returning its id
    ///
    /// Names need not be unique; ids are. The schedule is validated by
    /// computing the first firing time.
    pub async fn schedule_job(
        &self,
        name: impl Into<String>,
        schedule: ScheduleSpec,
        job_spec: JobSpec,
    ) -> Result<String, SchedulerError> {
        let name = name.into();
        let now = Utc::now();
        let next_run = schedule.next_run_after(now)?;

        let job_id = {
            let mut table = self.shared.table.lock().unwrap();
            table.job_counter += 1;
            let job_id = format!("job_{}_{}", table.job_counter, now.timestamp());
            table.jobs.insert(
                job_id.clone(),
                ScheduledJob {
                    job_id: job_id.clone(),
                    job_name: name.clone(),
                    schedule,
                    job_spec,
                    created_at: now,
                    last_run: None,
                    next_run: Some(next_run),
                    run_count: 0,
                    failure_count: 0,
                    enabled: true,
                },
            );
            job_id
        };
        self.shared.persist().await?;

        info!(job = %name, id = %job_id, next_run = %next_run, "Job scheduled");
        Ok(job_id)
    }

    /// Disable a job; it stays in the table with its history
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), SchedulerError> {
        {
            let mut table = self.shared.table.lock().unwrap();
            let job = table
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
            job.enabled = false;
            job.next_run = None;
        }
        self.shared.persist().await?;
        info!(id = %job_id, "Job cancelled");
        Ok(())
    }

    /// Snapshot of the job table, optionally including disabled jobs
    pub fn list_jobs(&self, include_disabled: bool) -> Vec<ScheduledJob> {
        self.shared
            .table
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|job| include_disabled || job.enabled)
            .cloned()
            .collect()
    }

    /// The `n` most recent execution records, oldest first
    pub fn job_history(&self, n: usize) -> Vec<JobExecution> {
        let history = self.shared.history.lock().unwrap();
        let skip = history.len().saturating_sub(n);
        history.iter().skip(skip).cloned().collect()
    }

    /// Point-in-time scheduler summary
    pub fn scheduler_status(&self) -> SchedulerStatus {
        let table = self.shared.table.lock().unwrap();
        let enabled_jobs = table.jobs.values().filter(|job| job.enabled).count();
        let next_run = table
            .jobs
            .values()
            .filter(|job| job.enabled)
            .filter_map(|job| job.next_run)
            .min();
        let history_len = self.shared.history.lock().unwrap().len();
        SchedulerStatus {
            running: matches!(
                self.agent.state(),
                corr_core::AgentState::Running | corr_core::AgentState::Paused
            ),
            total_jobs: table.jobs.len(),
            enabled_jobs,
            in_flight: self.shared.in_flight.load(Ordering::SeqCst),
            queued: self.shared.queue.len(),
            next_run,
            history_len,
            recent_executions: self.job_history(STATUS_RECENT_EXECUTIONS),
        }
    }
}

impl SchedulerShared {
    /// One tick: enqueue every due, enabled job up to the concurrency cap
    ///
    /// A deferred job keeps its `next_run` in the past, so the next tick
    /// retries it; the trigger is delayed, never dropped.
    async fn tick(&self, max_concurrent: usize) {
        let now = Utc::now();
        let mut fired = Vec::new();
        let mut deferred = 0usize;
        {
            let mut table = self.table.lock().unwrap();
            for job in table.jobs.values_mut() {
                if !job.enabled {
                    continue;
                }
                let Some(next) = job.next_run else { continue };
                if next > now {
                    continue;
                }
                let busy =
                    self.in_flight.load(Ordering::SeqCst) + self.queue.len() + fired.len();
                if busy >= max_concurrent {
                    deferred += 1;
                    continue;
                }
                match job.schedule.next_run_after(now) {
                    Ok(next) => job.next_run = Some(next),
                    Err(err) => {
                        warn!(job = %job.job_name, id = %job.job_id, error = %err,
                            "Disabling job with invalid schedule");
                        job.enabled = false;
                        job.next_run = None;
                        continue;
                    }
                }
                fired.push((job.job_id.clone(), job.job_name.clone()));
            }
        }

        if deferred > 0 {
            warn!(deferred, max_concurrent, "At capacity, deferring due jobs");
        }
        for (job_id, job_name) in &fired {
            debug!(job = %job_name, id = %job_id, "Dispatching scheduled job");
            self.queue.push(Task::new(
                format!("Job {job_name}"),
                TaskPayload::ExecuteJob {
                    job_id: job_id.clone(),
                    attempt: 0,
                },
                TaskPriority::Medium,
            ));
        }
        if !fired.is_empty() {
            if let Err(err) = self.persist().await {
                error!(error = %err, "Failed to persist job table after tick");
            }
        }
    }

    /// Execute one job, record the outcome and arm a retry on failure
    async fn execute_job(&self, job_id: &str, attempt: u32) -> TaskOutput {
        let _guard = InFlightGuard::new(&self.in_flight);

        let (job_name, job_spec) = {
            let table = self.table.lock().unwrap();
            match table.jobs.get(job_id) {
                Some(job) if job.enabled => (job.job_name.clone(), job.job_spec.clone()),
                Some(_) => {
                    return Err(TaskError::Other(format!("Job {job_id} is disabled")));
                }
                None => {
                    return Err(TaskError::Other(format!("Job {job_id} no longer scheduled")));
                }
            }
        };

        info!(job = %job_name, id = %job_id, attempt, "Executing scheduled job");
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        match self.dispatcher.dispatch(&job_spec).await {
            Ok(detail) => {
                {
                    let mut table = self.table.lock().unwrap();
                    if let Some(job) = table.jobs.get_mut(job_id) {
                        job.run_count += 1;
                        job.last_run = Some(Utc::now());
                    }
                }
                if let Err(err) = self.persist().await {
                    error!(error = %err, "Failed to persist job table");
                }
                self.record_execution(JobExecution {
                    job_id: job_id.to_string(),
                    job_name: job_name.clone(),
                    attempt,
                    started_at,
                    duration_ms: clock.elapsed().as_millis() as u64,
                    success: true,
                    error: None,
                });
                if let Some(events) = &self.events {
                    events.bus.publish(
                        SCHEDULER_AGENT_ID,
                        events.recipient.clone(),
                        MessageType::JobCompleted,
                        serde_json::json!({
                            "job_id": job_id,
                            "job_name": job_name,
                            "attempt": attempt,
                            "result": detail.clone(),
                        }),
                    );
                }
                Ok(serde_json::json!({ "job_id": job_id, "result": detail }))
            }
            Err(err) => {
                {
                    let mut table = self.table.lock().unwrap();
                    if let Some(job) = table.jobs.get_mut(job_id) {
                        job.failure_count += 1;
                    }
                }
                if let Err(persist_err) = self.persist().await {
                    error!(error = %persist_err, "Failed to persist job table");
                }
                self.record_execution(JobExecution {
                    job_id: job_id.to_string(),
                    job_name: job_name.clone(),
                    attempt,
                    started_at,
                    duration_ms: clock.elapsed().as_millis() as u64,
                    success: false,
                    error: Some(err.to_string()),
                });
                let will_retry = attempt < self.retry_attempts;
                if let Some(events) = &self.events {
                    events.bus.publish(
                        SCHEDULER_AGENT_ID,
                        events.recipient.clone(),
                        MessageType::JobFailed,
                        serde_json::json!({
                            "job_id": job_id,
                            "job_name": job_name.clone(),
                            "attempt": attempt,
                            "error": err.to_string(),
                            "will_retry": will_retry,
                        }),
                    );
                }

                if will_retry {
                    let retry_at = Utc::now() + self.retry_delay;
                    warn!(
                        job = %job_name,
                        id = %job_id,
                        attempt,
                        retry_at = %retry_at,
                        error = %err,
                        "Job failed, scheduling retry"
                    );
                    self.queue.push(
                        Task::new(
                            format!("Retry {job_name}"),
                            TaskPayload::ExecuteJob {
                                job_id: job_id.to_string(),
                                attempt: attempt + 1,
                            },
                            TaskPriority::High,
                        )
                        .with_scheduled_at(retry_at),
                    );
                } else {
                    error!(
                        job = %job_name,
                        id = %job_id,
                        error = %err,
                        "Job failed, retry budget exhausted"
                    );
                }
                Err(TaskError::Other(err.to_string()))
            }
        }
    }

    /// Append to the execution log, evicting the oldest entry at capacity
    fn record_execution(&self, entry: JobExecution) {
        let mut history = self.history.lock().unwrap();
        if history.len() >= JOB_HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(entry);
    }

    /// Write the current table through the store
    async fn persist(&self) -> Result<(), SchedulerError> {
        let snapshot = self.table.lock().unwrap().clone();
        self.store.save(&snapshot).await
    }
}

/// Handler the scheduler's agent runs `ExecuteJob` tasks through
struct JobExecutionHandler {
    shared: Arc<SchedulerShared>,
}

#[async_trait]
impl TaskHandler for JobExecutionHandler {
    fn name(&self) -> &str {
        "scheduler"
    }

    async fn handle(&self, task: &Task) -> TaskOutput {
        match &task.payload {
            TaskPayload::ExecuteJob { job_id, attempt } => {
                self.shared.execute_job(job_id, *attempt).await
            }
            _ => Err(TaskError::Unsupported {
                agent: "scheduler".to_string(),
            }),
        }
    }
}

/// Counts an execution as in-flight for its whole scope
struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
