//! System assembly, lifecycle and status queries

use crate::dispatch::CoordinatorDispatcher;
use crate::handlers::{AnalysisHandler, DataCollectionHandler};
use crate::stages::CoordinatorStageRunner;
use chrono::{DateTime, Utc};
use corr_core::{
    AgentHealth, AgentStatusReport, AnalysisKind, AnalysisService, CoreError, DataSource,
    MarketStore, Message, MessageType, Result, TaskPayload, TaskPriority,
};
use corr_runtime::{AgentConfig, AgentRegistry, AgentRuntime, MessageBus, MessageSubscriber};
use corr_scheduler::{JsonJobStore, Scheduler, SchedulerConfig};
use corr_utils::EngineConfig;
use corr_workflow::{WorkflowCounts, WorkflowEngine, WorkflowKind, WorkflowStatusReport};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Id of the data-collection agent
pub const DATA_AGENT_ID: &str = "data-collection-agent-001";
/// Id of the analysis agent
pub const ANALYSIS_AGENT_ID: &str = "analysis-agent-001";
/// Sender id the coordinator uses on the bus
const COORDINATOR_ID: &str = "coordinator";

/// The external collaborators the system is wired around
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn DataSource>,
    pub store: Arc<dyn MarketStore>,
    pub analysis: Arc<dyn AnalysisService>,
}

/// System-wide status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub running: bool,
    pub timestamp: DateTime<Utc>,
    pub agents: HashMap<String, AgentStatusReport>,
    pub workflows: WorkflowCounts,
    pub scheduler: corr_scheduler::SchedulerStatus,
    pub bus_backlog: usize,
}

/// System-wide health snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    /// True only when every registered agent is healthy
    pub overall_healthy: bool,
    pub agents: HashMap<String, AgentHealth>,
    pub timestamp: DateTime<Utc>,
}

/// Central orchestrator owning the agents, bus, workflow engine and scheduler
pub struct Coordinator {
    config: EngineConfig,
    registry: Arc<AgentRegistry>,
    bus: Arc<MessageBus>,
    engine: Arc<WorkflowEngine>,
    scheduler: Arc<Scheduler>,
    running: AtomicBool,
    ticker: tokio::sync::Mutex<TickerControl>,
}

struct TickerControl {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Bus subscriber that chains collection completion into analysis
struct CoordinatorSubscriber {
    registry: Arc<AgentRegistry>,
}

impl MessageSubscriber for CoordinatorSubscriber {
    fn name(&self) -> &str {
        COORDINATOR_ID
    }

    fn on_message(&self, message: &Message) -> Result<()> {
        match message.message_type {
            MessageType::DataAvailable if message.is_for(ANALYSIS_AGENT_ID) => {
                let symbols: Vec<String> = message.payload["symbols"]
                    .as_array()
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.as_str().map(ToString::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                if symbols.is_empty() {
                    return Err(CoreError::Communication(
                        "DataAvailable message carried no symbols".to_string(),
                    ));
                }

                let Some(agent) = self.registry.get(ANALYSIS_AGENT_ID) else {
                    debug!("Analysis agent not registered, dropping DataAvailable");
                    return Ok(());
                };
                agent.create_task(
                    "Correlation After Collection",
                    TaskPayload::RunAnalysis {
                        kind: AnalysisKind::Correlation,
                        symbols,
                    },
                    TaskPriority::Medium,
                    None,
                );
                Ok(())
            }
            MessageType::AnalysisComplete => {
                debug!(from = %message.sender_id, "Analysis results available");
                Ok(())
            }
            MessageType::JobCompleted => {
                debug!(
                    job = %message.payload["job_id"],
                    "Scheduled job completed"
                );
                Ok(())
            }
            MessageType::JobFailed => {
                warn!(
                    job = %message.payload["job_id"],
                    error = %message.payload["error"],
                    will_retry = message.payload["will_retry"].as_bool().unwrap_or(false),
                    "Scheduled job failed"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Coordinator {
    /// Validate the configuration and assemble the system
    ///
    /// Nothing starts executing until [`start_system`](Self::start_system).
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CoreError::Configuration(e.to_string()))?;

        let registry = Arc::new(AgentRegistry::new());
        let bus = Arc::new(MessageBus::new());

        if config.enable_data_collection {
            let handler = DataCollectionHandler::new(
                DATA_AGENT_ID,
                collaborators.source.clone(),
                bus.clone(),
                ANALYSIS_AGENT_ID,
            );
            registry.register(Arc::new(AgentRuntime::new(
                DATA_AGENT_ID,
                "DataCollectionAgent",
                Arc::new(handler),
                AgentConfig::default(),
            )));
        }
        if config.enable_analysis {
            let handler = AnalysisHandler::new(
                ANALYSIS_AGENT_ID,
                collaborators.store.clone(),
                collaborators.analysis.clone(),
                bus.clone(),
                COORDINATOR_ID,
            );
            registry.register(Arc::new(AgentRuntime::new(
                ANALYSIS_AGENT_ID,
                "AnalysisAgent",
                Arc::new(handler),
                AgentConfig::default(),
            )));
        }

        bus.subscribe(Arc::new(CoordinatorSubscriber {
            registry: registry.clone(),
        }));

        let runner = CoordinatorStageRunner::new(
            collaborators.source,
            collaborators.store,
            collaborators.analysis,
        );
        let engine = Arc::new(WorkflowEngine::new(
            Arc::new(runner),
            config.max_concurrent_workflows,
        ));

        let dispatcher = CoordinatorDispatcher::new(registry.clone(), engine.clone());
        let scheduler = Arc::new(Scheduler::with_bus(
            Arc::new(JsonJobStore::new(&config.schedule_file)),
            Arc::new(dispatcher),
            SchedulerConfig {
                tick_interval: Duration::from_secs(config.scheduler_tick_secs),
                max_concurrent_jobs: config.max_concurrent_jobs,
                retry_attempts: config.retry_attempts,
                retry_delay: Duration::from_secs(config.retry_delay_secs),
                agent: AgentConfig::default(),
            },
            bus.clone(),
            COORDINATOR_ID,
        ));

        info!(agents = registry.len(), "Coordinator assembled");
        Ok(Self {
            config,
            registry,
            bus,
            engine,
            scheduler,
            running: AtomicBool::new(false),
            ticker: tokio::sync::Mutex::new(TickerControl {
                token: CancellationToken::new(),
                handle: None,
            }),
        })
    }

    /// Start agents, scheduler and the maintenance ticker
    pub async fn start_system(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("System already running");
            return Ok(());
        }

        if self.config.auto_start_agents {
            self.registry.start_all().await;
        }
        if self.config.enable_scheduling {
            self.scheduler
                .start()
                .await
                .map_err(|e| CoreError::Other(e.to_string()))?;
        }
        self.start_ticker().await;

        info!("System started");
        Ok(())
    }

    /// Stop the ticker, the scheduler and every agent; safe to repeat
    pub async fn stop_system(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        {
            let mut ticker = self.ticker.lock().await;
            ticker.token.cancel();
            if let Some(handle) = ticker.handle.take() {
                let _ = handle.await;
            }
        }
        self.scheduler.stop().await;
        self.registry.stop_all().await;

        info!("System stopped");
    }

    /// Start a workflow over the configured (or given) symbols
    pub fn execute_workflow(
        &self,
        kind: WorkflowKind,
        symbols: Option<Vec<String>>,
        params: serde_json::Value,
    ) -> Uuid {
        let symbols = symbols.unwrap_or_else(|| self.config.symbols.clone());
        self.engine.start_workflow(symbols, kind, params)
    }

    /// Status of one workflow run
    pub fn workflow_status(&self, id: Uuid) -> Option<WorkflowStatusReport> {
        self.engine.workflow_status(id)
    }

    /// System-wide status snapshot
    pub fn get_system_status(&self) -> SystemStatus {
        SystemStatus {
            running: self.running.load(Ordering::SeqCst),
            timestamp: Utc::now(),
            agents: self.registry.status_all(),
            workflows: self.engine.counts(),
            scheduler: self.scheduler.scheduler_status(),
            bus_backlog: self.bus.backlog(),
        }
    }

    /// System-wide health snapshot
    pub fn get_system_health(&self) -> SystemHealth {
        let agents = self.registry.health_check_all();
        SystemHealth {
            overall_healthy: agents.values().all(|h| h.healthy),
            agents,
            timestamp: Utc::now(),
        }
    }

    /// Stop one agent, wait a grace period, start it again
    pub async fn restart_agent(&self, agent_id: &str) -> Result<()> {
        let agent = self
            .registry
            .get(agent_id)
            .ok_or_else(|| CoreError::AgentNotFound(agent_id.to_string()))?;

        info!(agent = %agent_id, "Restarting agent");
        agent.stop().await;
        tokio::time::sleep(Duration::from_secs(self.config.restart_grace_secs)).await;
        agent.start().await;
        Ok(())
    }

    /// The agent registry
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// The message bus
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// The workflow engine
    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    /// The scheduler
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    async fn start_ticker(&self) {
        let mut ticker = self.ticker.lock().await;
        ticker.token = CancellationToken::new();

        let token = ticker.token.clone();
        let registry = self.registry.clone();
        let bus = self.bus.clone();
        let config = self.config.clone();
        ticker.handle = Some(tokio::spawn(async move {
            run_ticker(registry, bus, config, token).await;
        }));
    }
}

/// Low-frequency maintenance loop
///
/// Each concern fires on its own elapsed-interval counter: periodic health
/// checks, a recurring comprehensive analysis and cleanup sweeps that also
/// prune the bus message log.
async fn run_ticker(
    registry: Arc<AgentRegistry>,
    bus: Arc<MessageBus>,
    config: EngineConfig,
    token: CancellationToken,
) {
    let tick = Duration::from_secs(config.system_tick_secs);
    let health_interval = Duration::from_secs(config.health_check_interval_secs);
    let analysis_interval = Duration::from_secs(config.analysis_interval_secs);
    let cleanup_interval = Duration::from_secs(config.cleanup_interval_secs);

    let mut last_health = Instant::now();
    let mut last_analysis = Instant::now();
    let mut last_cleanup = Instant::now();

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(tick) => {}
        }
        let now = Instant::now();

        if now.duration_since(last_health) >= health_interval {
            last_health = now;
            for (agent_id, health) in registry.health_check_all() {
                if !health.healthy {
                    warn!(
                        agent = %agent_id,
                        state = %health.state,
                        errors = health.error_count,
                        "Agent unhealthy"
                    );
                }
            }
        }

        if config.enable_analysis && now.duration_since(last_analysis) >= analysis_interval {
            last_analysis = now;
            if let Some(agent) = registry.get(ANALYSIS_AGENT_ID) {
                agent.create_task(
                    "Periodic Comprehensive Analysis",
                    TaskPayload::RunAnalysis {
                        kind: AnalysisKind::Comprehensive,
                        symbols: config.symbols.clone(),
                    },
                    TaskPriority::Medium,
                    None,
                );
            }
        }

        if now.duration_since(last_cleanup) >= cleanup_interval {
            last_cleanup = now;
            for agent_id in registry.agent_ids() {
                if let Some(agent) = registry.get(&agent_id) {
                    agent.create_task(
                        "Periodic Cleanup",
                        TaskPayload::Cleanup,
                        TaskPriority::Low,
                        None,
                    );
                }
            }
            let pruned = bus.prune_older_than(chrono::Duration::hours(1));
            if pruned > 0 {
                debug!(pruned, "Pruned old bus messages");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::{InMemoryMarketStore, StaticAnalysisService, StaticDataSource};

    fn collaborators() -> (Collaborators, Arc<InMemoryMarketStore>) {
        let store = Arc::new(InMemoryMarketStore::new());
        let collaborators = Collaborators {
            source: Arc::new(StaticDataSource::new(store.clone())),
            store: store.clone(),
            analysis: Arc::new(StaticAnalysisService),
        };
        (collaborators, store)
    }

    fn test_config(dir: &tempfile::TempDir) -> EngineConfig {
        EngineConfig {
            schedule_file: dir.path().join("schedules.json"),
            restart_grace_secs: 0,
            system_tick_secs: 1,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_construction_registers_enabled_agents() {
        let dir = tempfile::tempdir().unwrap();
        let (collab, _store) = collaborators();
        let coordinator = Coordinator::new(test_config(&dir), collab).unwrap();

        assert_eq!(coordinator.registry().len(), 2);
        assert!(coordinator.registry().get(DATA_AGENT_ID).is_some());
        assert!(coordinator.registry().get(ANALYSIS_AGENT_ID).is_some());
    }

    #[tokio::test]
    async fn test_disabled_agents_not_registered() {
        let dir = tempfile::tempdir().unwrap();
        let (collab, _store) = collaborators();
        let config = EngineConfig {
            enable_data_collection: false,
            ..test_config(&dir)
        };
        let coordinator = Coordinator::new(config, collab).unwrap();

        assert_eq!(coordinator.registry().len(), 1);
        assert!(coordinator.registry().get(DATA_AGENT_ID).is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal_to_construction() {
        let dir = tempfile::tempdir().unwrap();
        let (collab, _store) = collaborators();
        let config = EngineConfig {
            symbols: vec![],
            ..test_config(&dir)
        };
        assert!(matches!(
            Coordinator::new(config, collab),
            Err(CoreError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (collab, _store) = collaborators();
        let coordinator = Coordinator::new(test_config(&dir), collab).unwrap();

        coordinator.start_system().await.unwrap();
        coordinator.start_system().await.unwrap();
        assert!(coordinator.get_system_status().running);

        coordinator.stop_system().await;
        coordinator.stop_system().await;
        assert!(!coordinator.get_system_status().running);
    }

    #[tokio::test]
    async fn test_restart_unknown_agent() {
        let dir = tempfile::tempdir().unwrap();
        let (collab, _store) = collaborators();
        let coordinator = Coordinator::new(test_config(&dir), collab).unwrap();

        assert!(matches!(
            coordinator.restart_agent("no-such-agent").await,
            Err(CoreError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_job_outcome_reaches_bus() {
        let dir = tempfile::tempdir().unwrap();
        let (collab, _store) = collaborators();
        let config = EngineConfig {
            scheduler_tick_secs: 1,
            ..test_config(&dir)
        };
        let coordinator = Coordinator::new(config, collab).unwrap();
        coordinator.start_system().await.unwrap();

        // Dispatch fails because the target agent is not registered
        coordinator
            .scheduler()
            .schedule_job(
                "Orphan Task",
                corr_scheduler::ScheduleSpec::Interval { every_secs: 1 },
                corr_scheduler::JobSpec::AgentTask {
                    agent_id: "no-such-agent".to_string(),
                    task: corr_core::TaskSpec {
                        name: "Cleanup".to_string(),
                        payload: TaskPayload::Cleanup,
                        priority: TaskPriority::Low,
                    },
                },
            )
            .await
            .unwrap();

        let mut failed = None;
        for _ in 0..100 {
            failed = coordinator
                .bus()
                .recent_messages(50)
                .into_iter()
                .find(|m| m.message_type == MessageType::JobFailed);
            if failed.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        coordinator.stop_system().await;

        let failed = failed.expect("job failure should be announced on the bus");
        assert_eq!(failed.recipient_id, COORDINATOR_ID);
        assert_eq!(failed.payload["job_name"], "Orphan Task");
        assert!(
            coordinator
                .scheduler()
                .scheduler_status()
                .recent_executions
                .iter()
                .any(|e| !e.success)
        );
    }

    #[tokio::test]
    async fn test_health_reflects_all_agents() {
        let dir = tempfile::tempdir().unwrap();
        let (collab, _store) = collaborators();
        let coordinator = Coordinator::new(test_config(&dir), collab).unwrap();

        let health = coordinator.get_system_health();
        assert!(health.overall_healthy);
        assert_eq!(health.agents.len(), 2);
    }
}
