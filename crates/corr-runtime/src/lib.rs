//! Agent runtime for the multi-market correlation engine
//!
//! This crate provides the per-agent task queue and worker loop, the
//! synchronous publish/subscribe message bus used for cross-agent
//! notification, and the registry that tracks live agents.

pub mod agent;
pub mod bus;
pub mod handler;
pub mod queue;
pub mod registry;

pub use agent::{AgentConfig, AgentRuntime};
pub use bus::{MessageBus, MessageSubscriber};
pub use handler::{TaskHandler, TaskOutput};
pub use queue::TaskQueue;
pub use registry::AgentRegistry;
