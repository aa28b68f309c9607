//! Asynchronous analysis jobs

pub mod queue;
pub mod runner;
pub mod tasks;

pub use queue::{EnqueueError, JobQueue};
pub use runner::{AnalysisJob, AnalysisPayload, JobError, JobRunner, SessionTarget};
pub use tasks::{TaskRecord, TaskRegistry, TaskState};
