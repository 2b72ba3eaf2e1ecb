//! External collaborator contracts
//!
//! The statistical models, market-data collectors and storage engines are
//! deliberately outside this workspace. The engine talks to them through the
//! narrow traits defined here; concrete implementations live with the caller
//! (in-memory stubs ship with the coordinator crate for demos and tests).

use crate::error::Result;
use crate::task::AnalysisKind;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive date range for a collection or query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The trailing `days`-day window ending today
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now().date_naive();
        Self {
            start: end - Duration::days(days),
            end,
        }
    }
}

/// Per-symbol outcome of a collection batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolResult {
    pub symbol: String,
    pub success: bool,
    pub records_collected: u64,
    pub quality_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// One observation row in a market-data table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: f64,
}

/// A flat table of market observations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketTable {
    pub rows: Vec<MarketRow>,
}

impl MarketTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Distinct symbols present in the table, in first-seen order
    pub fn symbols(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.symbol) {
                seen.push(row.symbol.clone());
            }
        }
        seen
    }
}

/// Statistical/ML analysis behind a single request/response contract
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Run one analysis kind over the given symbols
    async fn analyze(
        &self,
        kind: AnalysisKind,
        symbols: &[String],
        params: &serde_json::Value,
    ) -> Result<serde_json::Value>;
}

/// Market-data collection behind a batch contract
///
/// Implementations persist what they collect; callers observe only the
/// per-symbol summaries and read the data back through [`MarketStore`].
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Collect data for the given symbols over the given range
    async fn collect(&self, symbols: &[String], range: DateRange) -> Result<Vec<SymbolResult>>;
}

/// Persistent market-data storage
///
/// The store is a shared, unlocked resource: any agent or workflow run may
/// read or write at any time, and callers must tolerate concurrent writers.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Fetch observations for the given symbols, optionally bounded by range
    async fn get_market_data(
        &self,
        symbols: &[String],
        range: Option<DateRange>,
    ) -> Result<MarketTable>;

    /// Append observations, returning the number of records written
    async fn save_market_data(&self, table: &MarketTable) -> Result<u64>;

    /// Cache a JSON document under a key (workflow summaries for the frontend)
    async fn cache_document(&self, key: &str, document: &serde_json::Value) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_days_window() {
        let range = DateRange::last_days(30);
        assert_eq!(range.end - range.start, Duration::days(30));
    }

    #[test]
    fn test_table_symbols_distinct() {
        let table = MarketTable {
            rows: vec![
                MarketRow {
                    symbol: "AAPL".to_string(),
                    date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                    close: 185.0,
                },
                MarketRow {
                    symbol: "MSFT".to_string(),
                    date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                    close: 420.0,
                },
                MarketRow {
                    symbol: "AAPL".to_string(),
                    date: NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
                    close: 186.5,
                },
            ],
        };

        assert_eq!(table.len(), 3);
        assert_eq!(table.symbols(), vec!["AAPL", "MSFT"]);
    }
}
