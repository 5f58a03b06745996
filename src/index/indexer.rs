//! Indexer: runs direct index definitions inline and deferred ones as tasks.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::IndexError;
use crate::index::model::{IndexName, IndexStatus, IndexVersion};
use crate::index::tasks::UpdateIndexTask;
use crate::index::tracker::IndexTracker;
use crate::library::{Photo, PhotoId, PhotoLibrary, SortOrder};
use crate::tasks::{TaskContext, TaskExecutor};

/// Photos fetched per page during catch-up.
const CATCH_UP_PAGE: usize = 100;

/// Index computed synchronously while a photo is being added.
#[async_trait]
pub trait DirectIndex: Send + Sync {
    async fn index(&self, photo: &Photo) -> crate::Result<()>;
}

/// Index computed later, inside a submitted task.
#[async_trait]
pub trait DeferredIndex: Send + Sync {
    async fn index(
        &self,
        ctx: &TaskContext,
        library: &dyn PhotoLibrary,
        photo: &Photo,
    ) -> crate::Result<()>;
}

/// Counters from one catch-up pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchUpReport {
    pub scanned: usize,
    pub dispatched_direct: usize,
    pub submitted_deferred: usize,
}

/// Which of a photo's indexes were handled by one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub direct: usize,
    pub deferred: usize,
}

/// Orchestrates index definitions against the tracker and executor.
pub struct Indexer {
    tracker: Arc<dyn IndexTracker>,
    executor: Arc<dyn TaskExecutor>,
    direct: Vec<(IndexName, Arc<dyn DirectIndex>)>,
    deferred: Vec<(IndexName, Arc<dyn DeferredIndex>)>,
}

impl Indexer {
    pub fn new(tracker: Arc<dyn IndexTracker>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            tracker,
            executor,
            direct: Vec::new(),
            deferred: Vec::new(),
        }
    }

    pub fn tracker(&self) -> &Arc<dyn IndexTracker> {
        &self.tracker
    }

    /// Register an index run inline by [`Indexer::add`].
    pub fn register_direct(
        &mut self,
        name: impl Into<IndexName>,
        version: IndexVersion,
        index: Arc<dyn DirectIndex>,
    ) {
        let name = name.into();
        self.tracker.register_index(name.clone(), version);
        info!(index = %name, version, "Registered direct index");
        self.direct.push((name, index));
    }

    /// Register an index run through an `updateIndex` task.
    pub fn register_deferred(
        &mut self,
        name: impl Into<IndexName>,
        version: IndexVersion,
        index: Arc<dyn DeferredIndex>,
    ) {
        let name = name.into();
        self.tracker.register_index(name.clone(), version);
        info!(index = %name, version, "Registered deferred index");
        self.deferred.push((name, index));
    }

    fn is_known(&self, name: &IndexName) -> bool {
        self.direct.iter().any(|(n, _)| n == name) || self.deferred.iter().any(|(n, _)| n == name)
    }

    /// Index a newly added photo: direct indexes now, deferred ones as tasks.
    pub async fn add(self: &Arc<Self>, photo: &Photo) -> crate::Result<Dispatch> {
        let names = self.all_names();
        self.dispatch(photo, &names).await
    }

    fn all_names(&self) -> Vec<IndexName> {
        self.direct
            .iter()
            .map(|(n, _)| n.clone())
            .chain(self.deferred.iter().map(|(n, _)| n.clone()))
            .collect()
    }

    /// Run or submit the given indexes for one photo.
    ///
    /// Every index is attempted; the first tracker or submission error is returned.
    pub async fn dispatch(
        self: &Arc<Self>,
        photo: &Photo,
        names: &[IndexName],
    ) -> crate::Result<Dispatch> {
        let mut dispatch = Dispatch::default();
        let mut first_error: Option<crate::Error> = None;

        for (name, index) in self.direct.iter().filter(|(n, _)| names.contains(n)) {
            let outcome = index.index(photo).await;
            if let Err(e) = &outcome {
                warn!(index = %name, photo = %photo.id, error = %e, "Direct index failed");
            }
            match self.tracker.update(name, &photo.id, outcome.err().as_ref()).await {
                Ok(()) => dispatch.direct += 1,
                Err(e) => {
                    warn!(index = %name, photo = %photo.id, error = %e, "Failed to record index state");
                    first_error.get_or_insert(e);
                }
            }
        }

        for (name, _) in self.deferred.iter().filter(|(n, _)| names.contains(n)) {
            let task = UpdateIndexTask::for_photo(self.clone(), name.clone(), photo.clone());
            match self.executor.submit(Box::new(task)).await {
                Ok(execution) => {
                    debug!(index = %name, photo = %photo.id, execution_id = %execution.id, "Submitted deferred index");
                    dispatch.deferred += 1;
                }
                Err(e) => {
                    warn!(index = %name, photo = %photo.id, error = %e, "Failed to submit deferred index");
                    first_error.get_or_insert(e.into());
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(dispatch),
        }
    }

    /// Run one index for one photo inside a task and record the outcome.
    ///
    /// A failure caused by shutdown is not recorded, so the photo stays
    /// pending for the next catch-up.
    pub async fn run_index(
        &self,
        name: &IndexName,
        ctx: &TaskContext,
        library: &dyn PhotoLibrary,
        photo: &Photo,
    ) -> crate::Result<()> {
        let outcome = if let Some((_, index)) = self.deferred.iter().find(|(n, _)| n == name) {
            index.index(ctx, library, photo).await
        } else if let Some((_, index)) = self.direct.iter().find(|(n, _)| n == name) {
            index.index(photo).await
        } else {
            return Err(IndexError::UnknownIndex(name.to_string()).into());
        };

        if outcome.is_err() && ctx.is_cancelled() {
            debug!(index = %name, photo = %photo.id, "Index interrupted by shutdown");
            return outcome;
        }
        self.tracker
            .update(name, &photo.id, outcome.as_ref().err())
            .await?;
        outcome
    }

    /// Missing indexes plus those that failed at their current version.
    pub async fn pending_indexes(&self, id: &PhotoId) -> crate::Result<Vec<IndexName>> {
        let mut pending = self.tracker.get_missing_indexes(id).await?;
        let (state, _) = self.tracker.get(id).await?;
        for (name, _) in self.tracker.registered() {
            if state.status_for(&name).status == IndexStatus::ErrorOnIndex
                && !pending.contains(&name)
            {
                pending.push(name);
            }
        }
        pending.retain(|name| self.is_known(name));
        Ok(pending)
    }

    /// Re-dispatch pending indexes for every photo in the library.
    ///
    /// Stops between photos once `ctx` is cancelled.
    pub async fn catch_up(
        self: &Arc<Self>,
        ctx: &TaskContext,
        library: &dyn PhotoLibrary,
    ) -> crate::Result<CatchUpReport> {
        let mut report = CatchUpReport::default();
        let mut start = 0;
        loop {
            let (photos, has_more) = library
                .find_all_paged(start, CATCH_UP_PAGE, SortOrder::Ascending)
                .await?;
            start += photos.len();

            for photo in &photos {
                if ctx.is_cancelled() {
                    info!(scanned = report.scanned, "Index catch-up interrupted");
                    return Ok(report);
                }
                report.scanned += 1;
                let pending = match self.pending_indexes(&photo.id).await {
                    Ok(pending) => pending,
                    Err(e) => {
                        // Reindexing everything overwrites an unreadable record.
                        warn!(photo = %photo.id, error = %e, "Unreadable index state, reindexing all");
                        self.all_names()
                    }
                };
                if pending.is_empty() {
                    continue;
                }
                debug!(photo = %photo.id, pending = ?pending, "Catching up indexes");
                match self.dispatch(photo, &pending).await {
                    Ok(dispatch) => {
                        report.dispatched_direct += dispatch.direct;
                        report.submitted_deferred += dispatch.deferred;
                    }
                    Err(e) => warn!(photo = %photo.id, error = %e, "Index catch-up failed for photo"),
                }
            }

            if !has_more || photos.is_empty() {
                break;
            }
        }
        info!(
            scanned = report.scanned,
            direct = report.dispatched_direct,
            deferred = report.submitted_deferred,
            "Index catch-up finished"
        );
        Ok(report)
    }
}
