//! Index maintenance tasks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::TaskError;
use crate::index::indexer::Indexer;
use crate::index::model::IndexName;
use crate::library::{Photo, PhotoId, PhotoLibrary};
use crate::tasks::{
    Task, TaskContext, TaskExecutor, TaskRegistry, decode_parameters, encode_parameters,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UpdateIndexParams {
    index: IndexName,
    #[serde(rename = "photoID")]
    photo_id: PhotoId,
    /// Snapshot taken at dispatch; the library is consulted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    photo: Option<Photo>,
}

/// Runs one index for one photo and records the outcome.
pub struct UpdateIndexTask {
    indexer: Arc<Indexer>,
    params: UpdateIndexParams,
}

impl UpdateIndexTask {
    pub const KIND: &'static str = "updateIndex";

    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self {
            indexer,
            params: UpdateIndexParams::default(),
        }
    }

    pub fn for_photo(indexer: Arc<Indexer>, index: IndexName, photo: Photo) -> Self {
        Self {
            indexer,
            params: UpdateIndexParams {
                index,
                photo_id: photo.id.clone(),
                photo: Some(photo),
            },
        }
    }
}

#[async_trait]
impl Task for UpdateIndexTask {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn describe(&self) -> String {
        format!(
            "Update index {} for photo {}",
            self.params.index, self.params.photo_id
        )
    }

    fn parameters(&self) -> serde_json::Value {
        encode_parameters(&self.params)
    }

    fn configure(&mut self, parameters: serde_json::Value) -> Result<(), TaskError> {
        self.params = decode_parameters(Self::KIND, parameters)?;
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        _executor: &dyn TaskExecutor,
        library: &dyn PhotoLibrary,
    ) -> crate::Result<()> {
        let photo = match &self.params.photo {
            Some(photo) => photo.clone(),
            None => library.get(&self.params.photo_id).await?,
        };
        self.indexer
            .run_index(&self.params.index, ctx, library, &photo)
            .await
    }
}

/// Re-dispatches pending indexes for the whole library.
pub struct ReindexTask {
    indexer: Arc<Indexer>,
}

impl ReindexTask {
    pub const KIND: &'static str = "reindex";

    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl Task for ReindexTask {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn describe(&self) -> String {
        "Catch up missing and failed indexes".to_string()
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
        self.indexer.catch_up(ctx, library).await?;
        Ok(())
    }
}

/// Register `reindex` (run on start) and `updateIndex`.
pub fn register_tasks(indexer: &Arc<Indexer>, registry: &mut TaskRegistry) -> Result<(), TaskError> {
    let reindex = indexer.clone();
    registry.register_startup(
        ReindexTask::KIND,
        Arc::new(move || Box::new(ReindexTask::new(reindex.clone())) as Box<dyn Task>),
    )?;
    let update = indexer.clone();
    registry.register(
        UpdateIndexTask::KIND,
        Arc::new(move || Box::new(UpdateIndexTask::new(update.clone())) as Box<dyn Task>),
    )?;
    Ok(())
}

/// Submit a `reindex` task every `interval` until cancelled or the executor stops.
pub fn spawn_reindex_ticker(
    indexer: Arc<Indexer>,
    executor: Arc<dyn TaskExecutor>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match executor
                .submit(Box::new(ReindexTask::new(indexer.clone())))
                .await
            {
                Ok(execution) => info!(execution_id = %execution.id, "Scheduled periodic reindex"),
                Err(TaskError::ExecutorStopped) => break,
                Err(e) => warn!(error = %e, "Failed to schedule periodic reindex"),
            }
        }
    })
}
