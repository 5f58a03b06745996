//! Execution records and their state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of one submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Queued, not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished without error.
    Completed,
    /// Finished with an error, or never started because the executor stopped.
    Failed,
}

impl ExecutionState {
    pub fn can_transition_to(&self, target: ExecutionState) -> bool {
        use ExecutionState::*;

        matches!(
            (self, target),
            (Pending, Running) | (Pending, Failed) | (Running, Completed) | (Running, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Tracked run record of one submitted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    /// Monotonic submission number.
    pub seq: u64,
    #[serde(rename = "type")]
    pub task_type: String,
    pub description: String,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: ExecutionState,
    pub error: Option<String>,
}

impl Execution {
    pub(crate) fn pending(seq: u64, task_type: &str, description: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq,
            task_type: task_type.to_string(),
            description,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            state: ExecutionState::Pending,
            error: None,
        }
    }

    /// Move to `state`, stamping start/finish times.
    pub(crate) fn transition_to(
        &mut self,
        state: ExecutionState,
        error: Option<String>,
    ) -> Result<(), String> {
        if !self.state.can_transition_to(state) {
            return Err(format!("Cannot transition from {} to {}", self.state, state));
        }
        self.state = state;
        match state {
            ExecutionState::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => {
                self.finished_at = Some(Utc::now());
                self.error = error;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Order executions by submission time, then submission number.
pub fn sort_by_submission(executions: &mut [Execution]) {
    executions.sort_by(|a, b| {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.seq.cmp(&b.seq))
    });
}
