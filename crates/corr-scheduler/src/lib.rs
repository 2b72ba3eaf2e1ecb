//! Persistent cron-like scheduler
//!
//! Jobs carry a recurrence rule (`ScheduleSpec`) and a serializable action
//! (`JobSpec`). A tick loop enqueues due jobs onto the scheduler's own agent
//! queue; execution delegates to a `JobDispatcher` implemented by the
//! coordinator. The job table is written through a `JobStore` on every
//! mutation, so schedules survive restarts.

pub mod dispatcher;
pub mod error;
pub mod job;
pub mod scheduler;
pub mod store;

pub use dispatcher::JobDispatcher;
pub use error::SchedulerError;
pub use job::{JobSpec, JobTable, ScheduledJob, ScheduleSpec};
pub use scheduler::{JobExecution, SCHEDULER_AGENT_ID, Scheduler, SchedulerConfig, SchedulerStatus};
pub use store::{JobStore, JsonJobStore};
