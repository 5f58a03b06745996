//! Task registry: name to constructor table.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::TaskError;
use crate::tasks::execution::Execution;
use crate::tasks::executor::TaskExecutor;
use crate::tasks::task::{Task, TaskEnvelope};

/// Constructor producing a blank task instance.
pub type TaskFactory = Arc<dyn Fn() -> Box<dyn Task> + Send + Sync>;

/// A registered task type.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub name: String,
    #[serde(skip)]
    factory: TaskFactory,
    /// Submitted once at every process start.
    pub run_on_start: bool,
}

impl std::fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("run_on_start", &self.run_on_start)
            .finish()
    }
}

/// Table of task types known to the process.
///
/// Filled during startup, then shared read-only.
#[derive(Default)]
pub struct TaskRegistry {
    definitions: Vec<TaskDefinition>,
    by_name: HashMap<String, usize>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task type. Duplicate names are rejected.
    pub fn register(&mut self, name: &str, factory: TaskFactory) -> Result<(), TaskError> {
        self.insert(name, factory, false)
    }

    /// Register a task type that is submitted at every start.
    pub fn register_startup(&mut self, name: &str, factory: TaskFactory) -> Result<(), TaskError> {
        self.insert(name, factory, true)
    }

    fn insert(
        &mut self,
        name: &str,
        factory: TaskFactory,
        run_on_start: bool,
    ) -> Result<(), TaskError> {
        if self.by_name.contains_key(name) {
            return Err(TaskError::DuplicateTaskType(name.to_string()));
        }
        self.by_name.insert(name.to_string(), self.definitions.len());
        self.definitions.push(TaskDefinition {
            name: name.to_string(),
            factory,
            run_on_start,
        });
        debug!(task_type = name, run_on_start, "Registered task type");
        Ok(())
    }

    /// A fresh, unconfigured instance of `name`.
    pub fn create_task(&self, name: &str) -> Result<Box<dyn Task>, TaskError> {
        let index = self
            .by_name
            .get(name)
            .ok_or_else(|| TaskError::UnknownTaskType(name.to_string()))?;
        Ok((self.definitions[*index].factory)())
    }

    /// An instance of `name` populated from `parameters`.
    pub fn create_task_with(
        &self,
        name: &str,
        parameters: serde_json::Value,
    ) -> Result<Box<dyn Task>, TaskError> {
        let mut task = self.create_task(name)?;
        task.configure(parameters)?;
        Ok(task)
    }

    /// Rebuild a task from its serialized form.
    pub fn decode(&self, envelope: &TaskEnvelope) -> Result<Box<dyn Task>, TaskError> {
        self.create_task_with(&envelope.kind, envelope.parameters.clone())
    }

    /// Definitions in registration order.
    pub fn defined_tasks(&self) -> &[TaskDefinition] {
        &self.definitions
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

/// Submit one instance of every task type flagged to run on start.
pub async fn launch_startup_tasks(
    registry: &TaskRegistry,
    executor: &dyn TaskExecutor,
) -> Result<Vec<Execution>, TaskError> {
    let mut launched = Vec::new();
    for definition in registry.defined_tasks().iter().filter(|d| d.run_on_start) {
        let task = registry.create_task_with(&definition.name, serde_json::Value::Null)?;
        let execution = executor.submit(task).await?;
        info!(task_type = %definition.name, execution_id = %execution.id, "Launched startup task");
        launched.push(execution);
    }
    Ok(launched)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tasks::executor::SerialExecutor;
    use crate::tasks::testing::{RecordingTask, recording_factory, test_library};

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry
            .register("record", recording_factory(Default::default()))
            .unwrap();
        registry
            .register_startup("startup", recording_factory(Default::default()))
            .unwrap();
        registry
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = registry();
        let err = registry
            .register("record", recording_factory(Default::default()))
            .unwrap_err();
        assert!(matches!(err, TaskError::DuplicateTaskType(name) if name == "record"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = registry().create_task("nope").err().unwrap();
        assert!(matches!(err, TaskError::UnknownTaskType(name) if name == "nope"));
    }

    #[test]
    fn definitions_keep_registration_order() {
        let names: Vec<_> = registry()
            .defined_tasks()
            .iter()
            .map(|d| (d.name.clone(), d.run_on_start))
            .collect();
        assert_eq!(
            names,
            vec![("record".to_string(), false), ("startup".to_string(), true)]
        );
    }

    #[test]
    fn definition_serializes_without_factory() {
        let json = serde_json::to_value(&registry().defined_tasks()[1]).unwrap();
        assert_eq!(json, json!({"name": "startup", "runOnStart": true}));
    }

    #[test]
    fn decode_populates_parameters() {
        let envelope = TaskEnvelope::new("record", json!({"label": "hello"}));
        let task = registry().decode(&envelope).unwrap();
        assert_eq!(task.describe(), "Record hello");
        assert_eq!(TaskEnvelope::of(task.as_ref()), envelope);
    }

    #[test]
    fn bad_parameters_are_rejected() {
        let err = registry()
            .create_task_with("record", json!({"label": 5}))
            .err()
            .unwrap();
        assert!(matches!(err, TaskError::InvalidParameters { .. }));
    }

    #[tokio::test]
    async fn startup_tasks_are_submitted() {
        let (_dir, library) = test_library().await;
        let executor = SerialExecutor::new(library, None);
        let launched = launch_startup_tasks(&registry(), &executor).await.unwrap();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].task_type, RecordingTask::KIND);

        let listed = executor.list_tasks().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, launched[0].id);
    }
}
