//! Concrete task handlers for the data-collection and analysis agents

use async_trait::async_trait;
use corr_core::{
    AnalysisService, DataSource, DateRange, MarketStore, MessageType, Task, TaskError,
    TaskPayload,
};
use corr_runtime::{MessageBus, TaskHandler, TaskOutput};
use std::sync::Arc;
use tracing::{debug, info};

/// Handler behind the data-collection agent
///
/// Collection itself is the data source's job; this handler drives a batch,
/// validates that at least one symbol succeeded and announces fresh data on
/// the bus, addressed to the analysis agent.
pub struct DataCollectionHandler {
    agent_id: String,
    source: Arc<dyn DataSource>,
    bus: Arc<MessageBus>,
    analysis_agent_id: String,
}

impl DataCollectionHandler {
    pub fn new(
        agent_id: impl Into<String>,
        source: Arc<dyn DataSource>,
        bus: Arc<MessageBus>,
        analysis_agent_id: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            source,
            bus,
            analysis_agent_id: analysis_agent_id.into(),
        }
    }

    async fn collect(&self, symbols: &[String], lookback_days: i64) -> TaskOutput {
        let range = DateRange::last_days(lookback_days);
        let results = self
            .source
            .collect(symbols, range)
            .await
            .map_err(|e| TaskError::Collaborator(e.to_string()))?;

        let succeeded: Vec<&str> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.symbol.as_str())
            .collect();
        if succeeded.is_empty() {
            return Err(TaskError::Collaborator(format!(
                "Collection failed for every symbol: {}",
                symbols.join(", ")
            )));
        }

        let total_records: u64 = results.iter().map(|r| r.records_collected).sum();
        info!(
            agent = %self.agent_id,
            symbols = succeeded.len(),
            records = total_records,
            "Data collection batch finished"
        );

        self.bus.publish(
            self.agent_id.clone(),
            self.analysis_agent_id.clone(),
            MessageType::DataAvailable,
            serde_json::json!({
                "symbols": succeeded,
                "records": total_records,
            }),
        );

        Ok(serde_json::json!({
            "symbols_succeeded": succeeded.len(),
            "symbols_requested": symbols.len(),
            "records_collected": total_records,
            "results": results,
        }))
    }
}

#[async_trait]
impl TaskHandler for DataCollectionHandler {
    fn name(&self) -> &str {
        &self.agent_id
    }

    async fn handle(&self, task: &Task) -> TaskOutput {
        match &task.payload {
            TaskPayload::CollectData {
                symbols,
                lookback_days,
            } => self.collect(symbols, *lookback_days).await,
            TaskPayload::Cleanup => {
                debug!(agent = %self.agent_id, "Cleanup sweep");
                Ok(serde_json::json!({ "cleaned": true }))
            }
            _ => Err(TaskError::Unsupported {
                agent: self.agent_id.clone(),
            }),
        }
    }
}

/// Handler behind the analysis agent
///
/// Reads observations back from the store, hands them to the analysis
/// service and announces the finished run on the bus.
pub struct AnalysisHandler {
    agent_id: String,
    store: Arc<dyn MarketStore>,
    analysis: Arc<dyn AnalysisService>,
    bus: Arc<MessageBus>,
    coordinator_id: String,
}

impl AnalysisHandler {
    pub fn new(
        agent_id: impl Into<String>,
        store: Arc<dyn MarketStore>,
        analysis: Arc<dyn AnalysisService>,
        bus: Arc<MessageBus>,
        coordinator_id: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            store,
            analysis,
            bus,
            coordinator_id: coordinator_id.into(),
        }
    }
}

#[async_trait]
impl TaskHandler for AnalysisHandler {
    fn name(&self) -> &str {
        &self.agent_id
    }

    async fn handle(&self, task: &Task) -> TaskOutput {
        match &task.payload {
            TaskPayload::RunAnalysis { kind, symbols } => {
                let table = self
                    .store
                    .get_market_data(symbols, None)
                    .await
                    .map_err(|e| TaskError::Collaborator(e.to_string()))?;
                if table.is_empty() {
                    return Err(TaskError::NoData(symbols.join(", ")));
                }

                let result = self
                    .analysis
                    .analyze(*kind, symbols, &serde_json::json!({}))
                    .await
                    .map_err(|e| TaskError::Collaborator(e.to_string()))?;

                info!(agent = %self.agent_id, kind = %kind, rows = table.len(), "Analysis finished");
                self.bus.publish(
                    self.agent_id.clone(),
                    self.coordinator_id.clone(),
                    MessageType::AnalysisComplete,
                    serde_json::json!({
                        "kind": kind.as_str(),
                        "symbols": symbols,
                    }),
                );

                Ok(result)
            }
            TaskPayload::Cleanup => {
                debug!(agent = %self.agent_id, "Cleanup sweep");
                Ok(serde_json::json!({ "cleaned": true }))
            }
            _ => Err(TaskError::Unsupported {
                agent: self.agent_id.clone(),
            }),
        }
    }
}
