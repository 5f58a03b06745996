//! Serial task executor.
//!
//! Submissions are appended to a FIFO queue and drained by a single loop
//! that runs exactly one task at a time. Every submission gets an
//! [`Execution`] record that stays listable for the executor's lifetime.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::TaskError;
use crate::library::PhotoLibrary;
use crate::tasks::execution::{Execution, ExecutionState};
use crate::tasks::task::{Task, TaskContext};

const NOT_STARTED: &str = "executor stopped before task started";

/// Submission and listing side of an executor.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Queue a task. Returns its execution in state `Pending` without waiting.
    async fn submit(&self, task: Box<dyn Task>) -> Result<Execution, TaskError>;

    /// Snapshot of every execution, in no particular order.
    async fn list_tasks(&self) -> Vec<Execution>;
}

struct QueuedTask {
    id: Uuid,
    task: Box<dyn Task>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedTask>,
    stopped: bool,
    next_seq: u64,
}

/// Executor running one task at a time in submission order.
pub struct SerialExecutor {
    library: Arc<dyn PhotoLibrary>,
    queue: Mutex<QueueState>,
    executions: RwLock<HashMap<Uuid, Execution>>,
    notify: Notify,
    /// `None` = unbounded.
    capacity: Option<usize>,
}

impl SerialExecutor {
    pub fn new(library: Arc<dyn PhotoLibrary>, capacity: Option<usize>) -> Self {
        Self {
            library,
            queue: Mutex::new(QueueState::default()),
            executions: RwLock::new(HashMap::new()),
            notify: Notify::new(),
            capacity,
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<Execution> {
        self.executions.read().await.get(&id).cloned()
    }

    pub async fn is_stopped(&self) -> bool {
        self.queue.lock().await.stopped
    }

    /// Number of tasks waiting to start.
    pub async fn queued(&self) -> usize {
        self.queue.lock().await.pending.len()
    }

    /// Run queued tasks until `cancel` fires.
    ///
    /// A task already executing is always allowed to finish. Tasks still
    /// queued at that point are failed and later submissions are refused.
    pub async fn drain_tasks(&self, cancel: CancellationToken) {
        info!(capacity = ?self.capacity, "Task executor started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let next = self.queue.lock().await.pending.pop_front();
            let queued = match next {
                Some(queued) => queued,
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.notify.notified() => {}
                    }
                    continue;
                }
            };
            self.run(queued, &cancel).await;
        }
        self.stop().await;
    }

    async fn run(&self, queued: QueuedTask, cancel: &CancellationToken) {
        let QueuedTask { id, task } = queued;
        self.transition(id, ExecutionState::Running, None).await;

        let span = info_span!("task", execution_id = %id, task_type = task.kind());
        let ctx = TaskContext::new(id, cancel.child_token());
        let outcome = AssertUnwindSafe(task.execute(&ctx, self, self.library.as_ref()))
            .catch_unwind()
            .instrument(span)
            .await;

        match outcome {
            Ok(Ok(())) => {
                debug!(execution_id = %id, "Task completed");
                self.transition(id, ExecutionState::Completed, None).await;
            }
            Ok(Err(e)) => {
                warn!(execution_id = %id, error = %e, "Task failed");
                self.transition(id, ExecutionState::Failed, Some(e.to_string()))
                    .await;
            }
            Err(payload) => {
                let err = TaskError::Panicked(panic_message(payload.as_ref()));
                error!(execution_id = %id, error = %err, "Task panicked");
                self.transition(id, ExecutionState::Failed, Some(err.to_string()))
                    .await;
            }
        }
    }

    async fn transition(&self, id: Uuid, state: ExecutionState, error: Option<String>) {
        let mut executions = self.executions.write().await;
        match executions.get_mut(&id) {
            Some(execution) => {
                if let Err(e) = execution.transition_to(state, error) {
                    warn!(execution_id = %id, "Invalid execution transition: {}", e);
                }
            }
            None => warn!(execution_id = %id, "Execution record missing"),
        }
    }

    /// Refuse new work and fail everything still queued.
    async fn stop(&self) {
        let abandoned: Vec<QueuedTask> = {
            let mut queue = self.queue.lock().await;
            queue.stopped = true;
            queue.pending.drain(..).collect()
        };
        for queued in &abandoned {
            self.transition(queued.id, ExecutionState::Failed, Some(NOT_STARTED.to_string()))
                .await;
        }
        info!(abandoned = abandoned.len(), "Task executor stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl TaskExecutor for SerialExecutor {
    async fn submit(&self, task: Box<dyn Task>) -> Result<Execution, TaskError> {
        let mut queue = self.queue.lock().await;
        if queue.stopped {
            return Err(TaskError::ExecutorStopped);
        }
        if let Some(capacity) = self.capacity
            && queue.pending.len() >= capacity
        {
            return Err(TaskError::QueueFull { capacity });
        }

        let seq = queue.next_seq;
        queue.next_seq += 1;
        let execution = Execution::pending(seq, task.kind(), task.describe());
        let id = execution.id;
        self.executions
            .write()
            .await
            .insert(id, execution.clone());
        queue.pending.push_back(QueuedTask { id, task });
        drop(queue);

        self.notify.notify_one();
        debug!(execution_id = %id, task_type = %execution.task_type, seq, "Task submitted");
        Ok(execution)
    }

    async fn list_tasks(&self) -> Vec<Execution> {
        self.executions.read().await.values().cloned().collect()
    }
}
