//! Shared fixtures for executor and registry tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::error::TaskError;
use crate::library::{BasicPhotoLibrary, PhotoLibrary};
use crate::store::LibSqlStore;
use crate::tasks::execution::Execution;
use crate::tasks::executor::{SerialExecutor, TaskExecutor};
use crate::tasks::registry::TaskFactory;
use crate::tasks::task::{Task, TaskContext, decode_parameters, encode_parameters};

pub async fn test_library() -> (tempfile::TempDir, Arc<BasicPhotoLibrary>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let library = BasicPhotoLibrary::new(dir.path(), store).await.unwrap();
    (dir, Arc::new(library))
}

/// Observations shared by every task of one test.
#[derive(Clone, Default)]
pub struct Probe {
    pub log: Arc<Mutex<Vec<String>>>,
    running: Arc<AtomicBool>,
    pub overlaps: Arc<AtomicUsize>,
}

impl Probe {
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordingParams {
    #[serde(default)]
    label: String,
}

/// Task that records its label and can spawn children, fail, panic or block.
#[derive(Default)]
pub struct RecordingTask {
    probe: Probe,
    label: String,
    pub children: Vec<String>,
    pub fail: bool,
    pub panic: bool,
    pub started: Option<Arc<Notify>>,
    pub gate: Option<Arc<Notify>>,
}

impl RecordingTask {
    pub const KIND: &'static str = "record";

    pub fn new(probe: &Probe, label: &str) -> Self {
        Self {
            probe: probe.clone(),
            label: label.to_string(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Task for RecordingTask {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn describe(&self) -> String {
        format!("Record {}", self.label)
    }

    fn parameters(&self) -> serde_json::Value {
        encode_parameters(&RecordingParams {
            label: self.label.clone(),
        })
    }

    fn configure(&mut self, parameters: serde_json::Value) -> Result<(), TaskError> {
        let params: RecordingParams = decode_parameters(Self::KIND, parameters)?;
        self.label = params.label;
        Ok(())
    }

    async fn execute(
        &self,
        _ctx: &TaskContext,
        executor: &dyn TaskExecutor,
        _library: &dyn PhotoLibrary,
    ) -> crate::Result<()> {
        if self.probe.running.swap(true, Ordering::SeqCst) {
            self.probe.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(started) = &self.started {
            started.notify_one();
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        tokio::task::yield_now().await;
        self.probe.log.lock().unwrap().push(self.label.clone());
        for child in &self.children {
            executor
                .submit(Box::new(RecordingTask::new(&self.probe, child)))
                .await?;
        }
        self.probe.running.store(false, Ordering::SeqCst);

        if self.panic {
            panic!("task {} exploded", self.label);
        }
        if self.fail {
            return Err(TaskError::Failed(format!("{} failed", self.label)).into());
        }
        Ok(())
    }
}

pub fn recording_factory(probe: Probe) -> TaskFactory {
    Arc::new(move || Box::new(RecordingTask::new(&probe, "")) as Box<dyn Task>)
}

/// Wait until `count` executions have reached a terminal state.
pub async fn wait_for_terminal(executor: &SerialExecutor, count: usize) -> Vec<Execution> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let list = executor.list_tasks().await;
            if list.iter().filter(|e| e.state.is_terminal()).count() >= count {
                return list;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("executions did not finish in time")
}
