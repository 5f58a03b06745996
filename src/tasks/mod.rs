//! Task subsystem: task trait, registry, execution records and the serial executor.

pub mod execution;
pub mod executor;
pub mod registry;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use execution::{Execution, ExecutionState, sort_by_submission};
pub use executor::{SerialExecutor, TaskExecutor};
pub use registry::{TaskDefinition, TaskFactory, TaskRegistry, launch_startup_tasks};
pub use task::{Task, TaskContext, TaskEnvelope, decode_parameters, encode_parameters};
