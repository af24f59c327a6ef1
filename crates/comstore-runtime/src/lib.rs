//! Background execution for comstore.
//!
//! - [`QueueManager`] holds deferred per-repository jobs and runs them in
//!   budget-sized batches.
//! - [`TaskManager`] keeps the named tasks and serializes invocations of
//!   the same task.
//! - [`Scheduler`] runs tasks by stage, on intervals and on events.
//! - [`Runtime`] walks the setup and startup stages and owns shutdown.
#![deny(unused_crate_dependencies)]

mod error;
mod queue;
mod runtime;
mod scheduler;
pub mod tasks;

pub use error::{SetupError, TaskError};
pub use queue::QueueManager;
pub use runtime::{Runtime, SETUP_RETRY_INTERVAL};
pub use scheduler::{Scheduler, StageReport};
pub use tasks::{RegisteredTask, Task, TaskContext, TaskDescriptor, TaskManager, TaskRun};

// Silence unused dev-dependency warnings
#[cfg(test)]
use tokio_test as _;
