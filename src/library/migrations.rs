//! Versioned per-photo migration chain.
//!
//! Steps are registered against the schema version that introduced them and
//! run in increasing version order for every photo whose stored schema is
//! older. A step leaves the photo untouched when it has nothing to fix.

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::error::LibraryError;
use crate::library::photo::{DEFAULT_ORIENTATION, Photo, content_hash};

/// Lazy access to stored photo bytes, relative to the photo directory.
pub struct ContentLoader {
    base: PathBuf,
}

impl ContentLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub async fn load(&self, relative: &Path) -> Result<Vec<u8>, LibraryError> {
        Ok(tokio::fs::read(self.base.join(relative)).await?)
    }
}

/// One migration step.
pub type StepFn =
    for<'a> fn(Photo, &'a ContentLoader) -> BoxFuture<'a, Result<Photo, LibraryError>>;

struct Step {
    version: u32,
    name: &'static str,
    apply: StepFn,
}

/// Outcome of a full migration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MigrationSummary {
    pub scanned: usize,
    pub migrated: usize,
    pub failed: usize,
}

/// Ordered collection of migration steps.
pub struct InstanceMigrations {
    steps: Vec<Step>,
}

impl InstanceMigrations {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Steps for the current photo schema.
    pub fn standard() -> Self {
        let mut migrations = Self::new();
        migrations.register(1, "normalize_path", normalize_path);
        migrations.register(1, "default_orientation", default_orientation);
        migrations.register(3, "backfill_hash", backfill_hash);
        migrations
    }

    /// Add a step. Steps with equal versions keep registration order.
    pub fn register(&mut self, version: u32, name: &'static str, apply: StepFn) {
        self.steps.push(Step {
            version,
            name,
            apply,
        });
        self.steps.sort_by_key(|s| s.version);
    }

    /// Highest version any step targets.
    pub fn latest_version(&self) -> u32 {
        self.steps.last().map(|s| s.version).unwrap_or(0)
    }

    /// Apply every step newer than the photo's schema.
    pub async fn apply(&self, photo: Photo, content: &ContentLoader) -> Result<Photo, LibraryError> {
        let latest = self.latest_version();
        if photo.schema >= latest {
            return Ok(photo);
        }
        let from = photo.schema;
        let mut current = photo;
        for step in self.steps.iter().filter(|s| s.version > from) {
            debug!(photo = %current.id, step = step.name, "Applying migration step");
            current = (step.apply)(current, content).await?;
        }
        current.schema = latest;
        Ok(current)
    }
}

impl Default for InstanceMigrations {
    fn default() -> Self {
        Self::new()
    }
}

fn needs_path_conversion(path: &Path) -> bool {
    path.to_string_lossy().contains('\\')
}

fn normalize_path(mut photo: Photo, _: &ContentLoader) -> BoxFuture<'_, Result<Photo, LibraryError>> {
    Box::pin(async move {
        if needs_path_conversion(&photo.path) {
            let old = photo.path.to_string_lossy().into_owned();
            photo.path = PathBuf::from(old.replace('\\', "/"));
            info!(photo = %photo.id, path = %photo.path.display(), oldpath = %old, "Fixed photo path");
        }
        Ok(photo)
    })
}

fn default_orientation(
    mut photo: Photo,
    _: &ContentLoader,
) -> BoxFuture<'_, Result<Photo, LibraryError>> {
    Box::pin(async move {
        if photo.orientation == 0 {
            photo.orientation = DEFAULT_ORIENTATION;
        }
        Ok(photo)
    })
}

fn backfill_hash(
    mut photo: Photo,
    content: &ContentLoader,
) -> BoxFuture<'_, Result<Photo, LibraryError>> {
    Box::pin(async move {
        if !photo.has_hash() {
            let bytes = content.load(&photo.path).await?;
            photo.hash = content_hash(&bytes);
        }
        Ok(photo)
    })
}
