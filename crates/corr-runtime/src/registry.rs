//! Directory of live agents
//!
//! The registry is an explicit object constructed once and passed by
//! reference to the coordinator, scheduler and reporting components; there is
//! no process-global instance. Concurrent register/unregister calls race on
//! the directory contents, which callers tolerate.

use crate::agent::AgentRuntime;
use corr_core::{AgentHealth, AgentStatusReport, CoreError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Registry for managing multiple agents
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<AgentRuntime>>>,
}

impl AgentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its id
    pub fn register(&self, agent: Arc<AgentRuntime>) {
        info!(agent = agent.name(), id = agent.agent_id(), "Agent registered");
        self.agents
            .write()
            .unwrap()
            .insert(agent.agent_id().to_string(), agent);
    }

    /// Remove and stop an agent
    pub async fn unregister(&self, agent_id: &str) -> Result<()> {
        let agent = self
            .agents
            .write()
            .unwrap()
            .remove(agent_id)
            .ok_or_else(|| CoreError::AgentNotFound(agent_id.to_string()))?;
        agent.stop().await;
        info!(agent = agent.name(), id = agent_id, "Agent unregistered");
        Ok(())
    }

    /// Look up an agent by id
    pub fn get(&self, agent_id: &str) -> Option<Arc<AgentRuntime>> {
        self.agents.read().unwrap().get(agent_id).cloned()
    }

    /// Ids of all registered agents
    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.read().unwrap().keys().cloned().collect()
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.agents.read().unwrap().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.agents.read().unwrap().is_empty()
    }

    /// Start all registered agents
    pub async fn start_all(&self) {
        let agents = self.snapshot();
        for agent in &agents {
            agent.start().await;
        }
        info!(count = agents.len(), "Started all agents");
    }

    /// Stop all registered agents
    pub async fn stop_all(&self) {
        for agent in self.snapshot() {
            agent.stop().await;
        }
        info!("All agents stopped");
    }

    /// Status snapshot for every agent, keyed by id
    pub fn status_all(&self) -> HashMap<String, AgentStatusReport> {
        self.snapshot()
            .into_iter()
            .map(|a| (a.agent_id().to_string(), a.status()))
            .collect()
    }

    /// Health check for every agent, keyed by id
    pub fn health_check_all(&self) -> HashMap<String, AgentHealth> {
        self.snapshot()
            .into_iter()
            .map(|a| (a.agent_id().to_string(), a.health_check()))
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<AgentRuntime>> {
        self.agents.read().unwrap().values().cloned().collect()
    }
}
