//! File-system + key-value store backed library.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{DatabaseError, LibraryError};
use crate::library::migrations::{ContentLoader, InstanceMigrations, MigrationSummary};
use crate::library::photo::{
    CURRENT_SCHEMA, DEFAULT_ORIENTATION, Photo, PhotoId, PhotoSource, SortOrder, canonicalize,
    content_hash,
};
use crate::library::{HASHES_NAMESPACE, PHOTOS_NAMESPACE, PhotoLibrary};
use crate::store::KvStore;

/// Subscriber invoked for every newly added photo.
pub type PhotoCallback = Arc<dyn Fn(Photo) -> BoxFuture<'static, crate::Result<()>> + Send + Sync>;

/// Library storing content files under `<base>/photos/YYYY/MM/DD/`.
pub struct BasicPhotoLibrary {
    photo_dir: PathBuf,
    store: Arc<dyn KvStore>,
    callbacks: RwLock<Vec<PhotoCallback>>,
    migrations: InstanceMigrations,
}

impl BasicPhotoLibrary {
    /// Create the library, making sure the photo directory exists.
    pub async fn new(base_dir: &Path, store: Arc<dyn KvStore>) -> Result<Self, LibraryError> {
        let photo_dir = base_dir.join("photos");
        tokio::fs::create_dir_all(&photo_dir).await?;
        info!(dir = %photo_dir.display(), "Photo library opened");
        Ok(Self {
            photo_dir,
            store,
            callbacks: RwLock::new(Vec::new()),
            migrations: InstanceMigrations::standard(),
        })
    }

    pub fn photo_dir(&self) -> &Path {
        &self.photo_dir
    }

    /// Register a subscriber. Subscribers run in registration order.
    pub fn add_callback(&self, callback: PhotoCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(callback);
    }

    fn snapshot_callbacks(&self) -> Vec<PhotoCallback> {
        self.callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn write_file(&self, relative: &Path, content: &[u8]) -> Result<u64, LibraryError> {
        let target = self.photo_dir.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(LibraryError::FileAlreadyExists(relative.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content).await?;
        file.flush().await?;
        Ok(content.len() as u64)
    }

    async fn store_photo(&self, photo: &Photo) -> Result<(), LibraryError> {
        let bytes = serde_json::to_vec(photo)
            .map_err(|e| DatabaseError::Serialization(format!("photo {}: {e}", photo.id)))?;
        self.store
            .put(PHOTOS_NAMESPACE, photo.id.as_str(), bytes)
            .await?;
        if photo.has_hash() {
            self.store
                .put(HASHES_NAMESPACE, &photo.hash, photo.id.as_str().as_bytes().to_vec())
                .await?;
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Photo>, LibraryError> {
        let entries = self.store.scan(PHOTOS_NAMESPACE).await?;
        let mut photos = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::from_slice::<Photo>(&value) {
                Ok(photo) => photos.push(photo),
                Err(e) => warn!(photo = %key, error = %e, "Skipping unreadable photo record"),
            }
        }
        Ok(photos)
    }
}

fn sort_photos(photos: &mut [Photo], order: SortOrder) {
    photos.sort_by(|a, b| {
        a.date_taken
            .cmp(&b.date_taken)
            .then_with(|| a.id.cmp(&b.id))
    });
    if order == SortOrder::Descending {
        photos.reverse();
    }
}

#[async_trait]
impl PhotoLibrary for BasicPhotoLibrary {
    async fn add(&self, source: PhotoSource, content: Vec<u8>) -> Result<Photo, LibraryError> {
        let (dir, filename, id) = canonicalize(&source);
        let hash = content_hash(&content);

        if let Some(existing) = self.store.get(HASHES_NAMESPACE, &hash).await? {
            let existing = String::from_utf8_lossy(&existing).into_owned();
            return Err(LibraryError::AlreadyExists(existing));
        }
        if self.store.get(PHOTOS_NAMESPACE, id.as_str()).await?.is_some() {
            return Err(LibraryError::AlreadyExists(id.to_string()));
        }

        let path = dir.join(&filename);
        let size = self.write_file(&path, &content).await?;

        let photo = Photo {
            id,
            path,
            date_taken: source.date_taken,
            location: source.location,
            format: source.format,
            orientation: DEFAULT_ORIENTATION,
            size,
            hash,
            schema: CURRENT_SCHEMA,
        };
        self.store_photo(&photo).await?;
        info!(photo = %photo.id, source = %source.name, location = ?photo.location, "Added");

        // Subscriber failures never undo the add.
        for callback in self.snapshot_callbacks() {
            if let Err(e) = callback(photo.clone()).await {
                warn!(photo = %photo.id, error = %e, "Photo callback failed");
            }
        }
        Ok(photo)
    }

    async fn get(&self, id: &PhotoId) -> Result<Photo, LibraryError> {
        let bytes = self
            .store
            .get(PHOTOS_NAMESPACE, id.as_str())
            .await?
            .ok_or_else(|| LibraryError::NotFound(id.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DatabaseError::Serialization(format!("photo {id}: {e}")).into())
    }

    async fn find_all(&self, order: SortOrder) -> Result<Vec<Photo>, LibraryError> {
        let mut photos = self.load_all().await?;
        sort_photos(&mut photos, order);
        Ok(photos)
    }

    async fn find_all_paged(
        &self,
        start: usize,
        max: usize,
        order: SortOrder,
    ) -> Result<(Vec<Photo>, bool), LibraryError> {
        let photos = self.find_all(order).await?;
        let total = photos.len();
        let page: Vec<Photo> = photos.into_iter().skip(start).take(max).collect();
        let has_more = start.saturating_add(max) < total;
        Ok((page, has_more))
    }

    async fn find(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        order: SortOrder,
    ) -> Result<Vec<Photo>, LibraryError> {
        let mut photos: Vec<Photo> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|p| p.date_taken >= start && p.date_taken < end)
            .collect();
        sort_photos(&mut photos, order);
        Ok(photos)
    }

    async fn update(&self, photo: &Photo) -> Result<(), LibraryError> {
        if self
            .store
            .get(PHOTOS_NAMESPACE, photo.id.as_str())
            .await?
            .is_none()
        {
            return Err(LibraryError::NotFound(photo.id.to_string()));
        }
        self.store_photo(photo).await?;
        debug!(photo = %photo.id, "Updated photo");
        Ok(())
    }

    async fn read_content(&self, id: &PhotoId) -> Result<Vec<u8>, LibraryError> {
        let photo = self.get(id).await?;
        Ok(tokio::fs::read(self.photo_dir.join(&photo.path)).await?)
    }

    async fn migrate_instances(&self) -> Result<MigrationSummary, LibraryError> {
        let photos = self.find_all(SortOrder::Ascending).await?;
        let loader = ContentLoader::new(&self.photo_dir);
        let mut summary = MigrationSummary {
            scanned: photos.len(),
            ..Default::default()
        };
        for photo in photos {
            let previous = photo.schema;
            let id = photo.id.clone();
            match self.migrations.apply(photo, &loader).await {
                Ok(updated) if updated.schema != previous => {
                    info!(
                        photo = %updated.id,
                        pre_schema = previous,
                        new_schema = updated.schema,
                        "Photo migrated"
                    );
                    self.store_photo(&updated).await?;
                    summary.migrated += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(photo = %id, error = %e, "Migration failed");
                    summary.failed += 1;
                }
            }
        }
        if summary.migrated > 0 {
            info!(count = summary.migrated, "Fixed photos in store");
        }
        Ok(summary)
    }
}
