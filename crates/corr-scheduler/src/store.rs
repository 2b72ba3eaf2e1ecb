//! Job table persistence

use crate::error::SchedulerError;
use crate::job::JobTable;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable storage for the scheduler's job table
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load the persisted table; `None` when nothing was saved yet
    async fn load(&self) -> Result<Option<JobTable>, SchedulerError>;

    /// Replace the persisted table
    async fn save(&self, table: &JobTable) -> Result<(), SchedulerError>;
}

/// `JobStore` backed by a single pretty-printed JSON document
pub struct JsonJobStore {
    path: PathBuf,
}

impl JsonJobStore {
    /// Create a store writing to the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl JobStore for JsonJobStore {
    async fn load(&self) -> Result<Option<JobTable>, SchedulerError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let table: JobTable = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), jobs = table.jobs.len(), "Job table loaded");
        Ok(Some(table))
    }

    async fn save(&self, table: &JobTable) -> Result<(), SchedulerError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(table)?;
        tokio::fs::write(&self.path, raw).await?;
        debug!(path = %self.path.display(), jobs = table.jobs.len(), "Job table saved");
        Ok(())
    }
}
