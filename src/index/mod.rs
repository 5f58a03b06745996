//! Derived-index tracking and maintenance.

pub mod indexer;
pub mod model;
pub mod record;
pub mod tasks;
pub mod tracker;

pub use indexer::{CatchUpReport, DeferredIndex, DirectIndex, Dispatch, Indexer};
pub use model::{ElementState, IndexEntry, IndexName, IndexState, IndexStatus, IndexVersion};
pub use tasks::{ReindexTask, UpdateIndexTask, register_tasks, spawn_reindex_ticker};
pub use tracker::{IndexTracker, StoreIndexTracker, TRACKER_NAMESPACE};
