//! Core types for the multi-market correlation engine
//!
//! This crate defines the fundamental data model shared across the engine:
//! tasks and their payloads, agent lifecycle state and metrics, inter-agent
//! messages, and the narrow contracts of the external collaborators
//! (analysis, data collection, storage).

pub mod collab;
pub mod error;
pub mod message;
pub mod state;
pub mod task;

pub use collab::{AnalysisService, DataSource, DateRange, MarketRow, MarketStore, MarketTable, SymbolResult};
pub use error::{CoreError, Result, TaskError};
pub use message::{Message, MessageType};
pub use state::{AgentHealth, AgentMetrics, AgentState, AgentStatusReport};
pub use task::{AnalysisKind, Task, TaskPayload, TaskPriority, TaskReport, TaskSpec};
