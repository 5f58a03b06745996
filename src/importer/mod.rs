//! Import of photo files from the local filesystem.

pub mod dir;
pub mod file;

use std::sync::Arc;

use crate::error::TaskError;
use crate::tasks::{Task, TaskRegistry};

pub use dir::ImportDirTask;
pub use file::ImportFileTask;

/// Directory names never descended into (Synology thumbnail caches).
pub const SKIPPED_DIRS: &[&str] = &["@eaDir", "@eadir"];

pub fn register_tasks(registry: &mut TaskRegistry) -> Result<(), TaskError> {
    registry.register(
        ImportDirTask::KIND,
        Arc::new(|| Box::new(ImportDirTask::default()) as Box<dyn Task>),
    )?;
    registry.register(
        ImportFileTask::KIND,
        Arc::new(|| Box::new(ImportFileTask::default()) as Box<dyn Task>),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_both_task_types() {
        let mut registry = TaskRegistry::new();
        register_tasks(&mut registry).unwrap();
        assert!(registry.contains("importDir"));
        assert!(registry.contains("importFile"));
        assert!(register_tasks(&mut registry).is_err());
    }
}
