//! Task trait and wire envelope.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TaskError;
use crate::library::PhotoLibrary;
use crate::tasks::executor::TaskExecutor;

/// Per-execution context handed to [`Task::execute`].
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub execution_id: Uuid,
    cancel: CancellationToken,
}

impl TaskContext {
    pub fn new(execution_id: Uuid, cancel: CancellationToken) -> Self {
        Self {
            execution_id,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token to pass into blocking calls that should stop on shutdown.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail fast when shutdown has been requested.
    pub fn check_cancelled(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A named, serializable unit of work run by the executor.
///
/// Instances are created blank by a registry factory and then populated with
/// [`Task::configure`]. Identity is assigned by the executor on submission.
#[async_trait]
pub trait Task: Send + Sync {
    /// Registered type name.
    fn kind(&self) -> &'static str;

    /// Human-readable description shown in execution listings.
    fn describe(&self) -> String;

    /// Current parameters as a flat JSON object.
    fn parameters(&self) -> serde_json::Value;

    /// Populate the task from externally supplied parameters.
    fn configure(&mut self, parameters: serde_json::Value) -> Result<(), TaskError>;

    /// Run the task. `executor` accepts follow-up tasks.
    async fn execute(
        &self,
        ctx: &TaskContext,
        executor: &dyn TaskExecutor,
        library: &dyn PhotoLibrary,
    ) -> crate::Result<()>;
}

/// Serialized form of a task: type tag plus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl TaskEnvelope {
    pub fn new(kind: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            parameters,
        }
    }

    /// Envelope describing an existing task.
    pub fn of(task: &dyn Task) -> Self {
        Self::new(task.kind(), task.parameters())
    }
}

/// Deserialize task parameters, treating a missing payload as `{}`.
pub fn decode_parameters<T: DeserializeOwned>(
    name: &str,
    parameters: serde_json::Value,
) -> Result<T, TaskError> {
    let parameters = match parameters {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(parameters).map_err(|e| TaskError::InvalidParameters {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Serialize task parameters; falls back to `null` if serialization fails.
pub fn encode_parameters<T: Serialize>(parameters: &T) -> serde_json::Value {
    serde_json::to_value(parameters).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Params {
        #[serde(default)]
        dryrun: bool,
        path: Option<String>,
    }

    #[test]
    fn null_parameters_decode_as_empty_object() {
        let params: Params = decode_parameters("t", serde_json::Value::Null).unwrap();
        assert_eq!(params, Params::default());
    }

    #[test]
    fn invalid_parameters_are_reported() {
        let err = decode_parameters::<Params>("t", json!({"dryrun": "yes"})).unwrap_err();
        assert!(matches!(err, TaskError::InvalidParameters { ref name, .. } if name == "t"));
    }

    #[test]
    fn envelope_uses_type_tag() {
        let envelope: TaskEnvelope =
            serde_json::from_value(json!({"type": "importDir", "parameters": {"importdir": "/x"}}))
                .unwrap();
        assert_eq!(envelope.kind, "importDir");
        assert_eq!(envelope.parameters["importdir"], "/x");

        let bare: TaskEnvelope = serde_json::from_value(json!({"type": "reindex"})).unwrap();
        assert!(bare.parameters.is_null());
    }

    #[test]
    fn context_reports_cancellation() {
        let token = CancellationToken::new();
        let ctx = TaskContext::new(Uuid::new_v4(), token.clone());
        assert!(ctx.check_cancelled().is_ok());
        token.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(TaskError::Cancelled)));
    }
}
