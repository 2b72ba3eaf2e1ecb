//! System coordinator for the multi-market correlation engine
//!
//! The coordinator wires the agents, message bus, workflow engine and
//! scheduler into one runnable system: it constructs the concrete agent
//! handlers around the external collaborators, reacts to bus notifications,
//! runs the periodic maintenance ticker and answers system-wide status and
//! health queries.

pub mod coordinator;
pub mod dispatch;
pub mod handlers;
pub mod stages;
pub mod stubs;

pub use coordinator::{
    ANALYSIS_AGENT_ID, Collaborators, Coordinator, DATA_AGENT_ID, SystemHealth, SystemStatus,
};
pub use dispatch::CoordinatorDispatcher;
pub use handlers::{AnalysisHandler, DataCollectionHandler};
pub use stages::CoordinatorStageRunner;
pub use stubs::{InMemoryMarketStore, StaticAnalysisService, StaticDataSource};
