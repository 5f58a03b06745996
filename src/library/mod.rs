//! Photo library: the storage collaborator tasks and indexes operate on.

pub mod basic;
pub mod migrations;
pub mod photo;
pub mod tasks;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LibraryError;

pub use basic::{BasicPhotoLibrary, PhotoCallback};
pub use migrations::{InstanceMigrations, MigrationSummary};
pub use photo::{
    CURRENT_SCHEMA, Coordinates, DEFAULT_ORIENTATION, Format, Photo, PhotoId, PhotoSource,
    SortOrder, content_hash,
};
pub use tasks::{MigrateInstancesTask, register_tasks};

/// Store namespace holding photo metadata keyed by id.
pub const PHOTOS_NAMESPACE: &str = "photos";
/// Store namespace mapping content hash to photo id.
pub const HASHES_NAMESPACE: &str = "hashes";

/// Media library operations used by tasks and indexes.
#[async_trait]
pub trait PhotoLibrary: Send + Sync {
    /// Store a new photo and notify subscribers.
    ///
    /// Fails with [`LibraryError::AlreadyExists`] when identical content is
    /// already stored, or [`LibraryError::FileAlreadyExists`] when the
    /// canonical target file is taken.
    async fn add(&self, source: PhotoSource, content: Vec<u8>) -> Result<Photo, LibraryError>;

    async fn get(&self, id: &PhotoId) -> Result<Photo, LibraryError>;

    async fn find_all(&self, order: SortOrder) -> Result<Vec<Photo>, LibraryError>;

    /// One page of photos, plus whether more follow.
    async fn find_all_paged(
        &self,
        start: usize,
        max: usize,
        order: SortOrder,
    ) -> Result<(Vec<Photo>, bool), LibraryError>;

    /// Photos taken in `[start, end)`.
    async fn find(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        order: SortOrder,
    ) -> Result<Vec<Photo>, LibraryError>;

    /// Overwrite the metadata of an existing photo.
    async fn update(&self, photo: &Photo) -> Result<(), LibraryError>;

    async fn read_content(&self, id: &PhotoId) -> Result<Vec<u8>, LibraryError>;

    /// Bring every stored photo up to the current schema.
    async fn migrate_instances(&self) -> Result<MigrationSummary, LibraryError>;
}
