//! In-memory collaborator implementations
//!
//! The real collectors, statistical models and storage engines live outside
//! this workspace. These stubs are deterministic stand-ins that make the
//! engine runnable end-to-end in the demo binary and in tests.

use async_trait::async_trait;
use chrono::Duration;
use corr_core::{
    AnalysisKind, AnalysisService, DataSource, DateRange, MarketRow, MarketStore, MarketTable,
    Result, SymbolResult,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// `MarketStore` backed by process memory
#[derive(Default)]
pub struct InMemoryMarketStore {
    rows: Mutex<Vec<MarketRow>>,
    documents: Mutex<HashMap<String, serde_json::Value>>,
}

impl InMemoryMarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached document by key
    pub fn cached_document(&self, key: &str) -> Option<serde_json::Value> {
        self.documents.lock().unwrap().get(key).cloned()
    }

    /// Total observation rows held
    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn get_market_data(
        &self,
        symbols: &[String],
        range: Option<DateRange>,
    ) -> Result<MarketTable> {
        let rows = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| symbols.contains(&row.symbol))
            .filter(|row| {
                range.is_none_or(|r| row.date >= r.start && row.date <= r.end)
            })
            .cloned()
            .collect();
        Ok(MarketTable { rows })
    }

    async fn save_market_data(&self, table: &MarketTable) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        rows.extend(table.rows.iter().cloned());
        Ok(table.rows.len() as u64)
    }

    async fn cache_document(&self, key: &str, document: &serde_json::Value) -> Result<()> {
        self.documents
            .lock()
            .unwrap()
            .insert(key.to_string(), document.clone());
        Ok(())
    }
}

/// `DataSource` that synthesizes a deterministic price walk
///
/// Collected rows are written through the store, matching the contract that
/// a source persists what it collects.
pub struct StaticDataSource {
    store: Arc<dyn MarketStore>,
}

impl StaticDataSource {
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    fn base_price(symbol: &str) -> f64 {
        // Stable per-symbol seed derived from the name
        let seed: u32 = symbol.bytes().map(u32::from).sum();
        50.0 + f64::from(seed % 400)
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn collect(&self, symbols: &[String], range: DateRange) -> Result<Vec<SymbolResult>> {
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let base = Self::base_price(symbol);
            let mut rows = Vec::new();
            let mut date = range.start;
            let mut day = 0u32;
            while date <= range.end {
                rows.push(MarketRow {
                    symbol: symbol.clone(),
                    date,
                    close: base + f64::from(day % 7) * 0.5,
                });
                date += Duration::days(1);
                day += 1;
            }

            let written = self
                .store
                .save_market_data(&MarketTable { rows })
                .await?;
            results.push(SymbolResult {
                symbol: symbol.clone(),
                success: true,
                records_collected: written,
                quality_score: 1.0,
                error_message: None,
            });
        }
        Ok(results)
    }
}

/// `AnalysisService` that reports summary shapes instead of real statistics
pub struct StaticAnalysisService;

#[async_trait]
impl AnalysisService for StaticAnalysisService {
    async fn analyze(
        &self,
        kind: AnalysisKind,
        symbols: &[String],
        _params: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let pairs = symbols.len() * symbols.len().saturating_sub(1) / 2;
        Ok(serde_json::json!({
            "kind": kind.as_str(),
            "symbols": symbols,
            "pairs_evaluated": pairs,
            "status": "completed",
        }))
    }
}
