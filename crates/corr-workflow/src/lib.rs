//! Workflow engine for the multi-market correlation engine
//!
//! A workflow is a named, ordered sequence of stages spanning multiple
//! agents and collaborators. Stages run strictly in list order; a critical
//! stage failure aborts the run, a non-critical failure is recorded and the
//! run proceeds. Runs execute concurrently through a bounded worker pool.

pub mod engine;
pub mod error;
pub mod run;
pub mod stage;

pub use engine::{StageContext, StageRunner, WorkflowEngine};
pub use error::WorkflowError;
pub use run::{WorkflowCounts, WorkflowRun, WorkflowStatus, WorkflowStatusReport};
pub use stage::{Stage, StageOutcome, StageSpec, WorkflowDefinition, WorkflowKind};
