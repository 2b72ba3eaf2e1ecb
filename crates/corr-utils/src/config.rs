//! Engine configuration
//!
//! One serde document configures the whole system: which agents to run,
//! the periodic maintenance intervals, workflow concurrency and the
//! scheduler's tuning. Every field has a default, so an empty JSON object
//! is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration document could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field value is out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Symbols the periodic collection and analysis tasks operate on
    pub symbols: Vec<String>,

    /// Whether to construct the data-collection agent
    pub enable_data_collection: bool,
    /// Whether to construct the analysis agent
    pub enable_analysis: bool,
    /// Start all agents during system startup
    pub auto_start_agents: bool,
    /// Start the scheduler during system startup
    pub enable_scheduling: bool,

    /// Trailing window for periodic data collection
    pub lookback_days: i64,

    /// Seconds between system ticker iterations
    pub system_tick_secs: u64,
    /// Seconds between periodic health checks
    pub health_check_interval_secs: u64,
    /// Seconds between periodic comprehensive analysis tasks
    pub analysis_interval_secs: u64,
    /// Seconds between periodic cleanup sweeps
    pub cleanup_interval_secs: u64,
    /// Grace period between stop and start when restarting an agent
    pub restart_grace_secs: u64,

    /// Cap on concurrently executing workflow runs
    pub max_concurrent_workflows: usize,

    /// Seconds between scheduler ticks
    pub scheduler_tick_secs: u64,
    /// Cap on concurrently executing scheduled jobs
    pub max_concurrent_jobs: usize,
    /// Retries granted to a failed job execution chain
    pub retry_attempts: u32,
    /// Fixed delay before a job retry, in seconds
    pub retry_delay_secs: u64,
    /// Where the scheduler persists its job table
    pub schedule_file: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "AAPL".to_string(),
                "MSFT".to_string(),
                "GOOGL".to_string(),
                "TSLA".to_string(),
            ],
            enable_data_collection: true,
            enable_analysis: true,
            auto_start_agents: true,
            enable_scheduling: true,
            lookback_days: 30,
            system_tick_secs: 10,
            health_check_interval_secs: 300,
            analysis_interval_secs: 1800,
            cleanup_interval_secs: 3600,
            restart_grace_secs: 2,
            max_concurrent_workflows: 3,
            scheduler_tick_secs: 30,
            max_concurrent_jobs: 5,
            retry_attempts: 3,
            retry_delay_secs: 60,
            schedule_file: PathBuf::from("data/schedules.json"),
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one symbol is required".to_string(),
            ));
        }
        if self.lookback_days < 1 {
            return Err(ConfigError::Invalid(
                "lookback_days must be at least 1".to_string(),
            ));
        }
        if self.system_tick_secs == 0 || self.scheduler_tick_secs == 0 {
            return Err(ConfigError::Invalid(
                "tick intervals must be at least one second".to_string(),
            ));
        }
        if self.max_concurrent_workflows == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_workflows must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enable_data_collection);
        assert_eq!(config.retry_attempts, 3);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.symbols, EngineConfig::default().symbols);
        assert_eq!(config.max_concurrent_jobs, 5);
    }

    #[test]
    fn test_partial_overrides() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"symbols": ["NVDA"], "auto_start_agents": false, "retry_delay_secs": 5}"#,
        )
        .unwrap();
        assert_eq!(config.symbols, vec!["NVDA".to_string()]);
        assert!(!config.auto_start_agents);
        assert_eq!(config.retry_delay_secs, 5);
        assert!(config.enable_analysis);
    }

    #[test]
    fn test_validation_rejects_empty_symbols() {
        let config = EngineConfig {
            symbols: vec![],
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"max_concurrent_workflows": 1}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.max_concurrent_workflows, 1);

        assert!(EngineConfig::from_file(dir.path().join("missing.json")).is_err());
    }
}
