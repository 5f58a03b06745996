//! Library maintenance tasks.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::TaskError;
use crate::library::PhotoLibrary;
use crate::tasks::{Task, TaskContext, TaskExecutor, TaskRegistry};

/// Upgrades every stored photo to the current schema.
#[derive(Debug, Default)]
pub struct MigrateInstancesTask;

impl MigrateInstancesTask {
    pub const KIND: &'static str = "migrateInstances";
}

#[async_trait]
impl Task for MigrateInstancesTask {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn describe(&self) -> String {
        "Migrate photo records to the current schema".to_string()
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    fn configure(&mut self, _parameters: serde_json::Value) -> Result<(), TaskError> {
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        _executor: &dyn TaskExecutor,
        library: &dyn PhotoLibrary,
    ) -> crate::Result<()> {
        ctx.check_cancelled()?;
        let summary = library.migrate_instances().await?;
        info!(
            scanned = summary.scanned,
            migrated = summary.migrated,
            failed = summary.failed,
            "Photo migration finished"
        );
        Ok(())
    }
}

/// Register `migrateInstances` as a run-on-start task.
pub fn register_tasks(registry: &mut TaskRegistry) -> Result<(), TaskError> {
    registry.register_startup(
        MigrateInstancesTask::KIND,
        Arc::new(|| Box::new(MigrateInstancesTask) as Box<dyn Task>),
    )
}
