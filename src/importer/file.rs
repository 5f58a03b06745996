//! `importFile` task: adds one file to the library.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::library::{Format, PhotoLibrary, PhotoSource};
use crate::tasks::{Task, TaskContext, TaskExecutor, decode_parameters, encode_parameters};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ImportFileParams {
    #[serde(default)]
    path: PathBuf,
    #[serde(default)]
    dryrun: bool,
    #[serde(default)]
    delete: bool,
}

#[derive(Debug, Default)]
pub struct ImportFileTask {
    params: ImportFileParams,
}

impl ImportFileTask {
    pub const KIND: &'static str = "importFile";

    pub fn new(path: impl Into<PathBuf>, dry_run: bool, delete_after_import: bool) -> Self {
        Self {
            params: ImportFileParams {
                path: path.into(),
                dryrun: dry_run,
                delete: delete_after_import,
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.params.path
    }
}

/// Name, format and capture time derived from the file itself.
///
/// Returns `None` for files whose extension is not a supported format.
async fn inspect(path: &Path) -> std::io::Result<Option<PhotoSource>> {
    let Some(format) = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(Format::from_extension)
    else {
        return Ok(None);
    };
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let modified = tokio::fs::metadata(path).await?.modified()?;
    Ok(Some(PhotoSource {
        name,
        date_taken: DateTime::<Utc>::from(modified),
        location: None,
        format,
    }))
}

#[async_trait]
impl Task for ImportFileTask {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn describe(&self) -> String {
        format!("Importing file {}", self.params.path.display())
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
        let path = &self.params.path;
        let Some(source) = inspect(path).await? else {
            debug!(file = %path.display(), "Skipping, not a supported photo");
            return Ok(());
        };
        info!(file = %path.display(), format = ?source.format, "Found image");
        if self.params.dryrun {
            return Ok(());
        }

        ctx.check_cancelled()?;
        let content = tokio::fs::read(path).await?;
        library.add(source, content).await?;

        if self.params.delete {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(file = %path.display(), error = %e, "Delete failed");
                return Err(e.into());
            }
            info!(file = %path.display(), "Deleted file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use super::*;
    use crate::error::LibraryError;
    use crate::library::SortOrder;
    use crate::tasks::SerialExecutor;
    use crate::tasks::testing::test_library;

    fn ctx() -> TaskContext {
        TaskContext::new(Uuid::new_v4(), CancellationToken::new())
    }

    #[tokio::test]
    async fn imports_supported_file() {
        let (_lib_dir, library) = test_library().await;
        let executor = SerialExecutor::new(library.clone(), None);
        let src = tempfile::tempdir().unwrap();
        let file = src.path().join("Holiday.JPG");
        tokio::fs::write(&file, b"jpeg bytes").await.unwrap();

        ImportFileTask::new(&file, false, false)
            .execute(&ctx(), &executor, library.as_ref())
            .await
            .unwrap();

        let photos = library.find_all(SortOrder::Ascending).await.unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].format, Format::Jpeg);
        assert!(photos[0].path.ends_with("Holiday.jpg"));
        assert_eq!(library.read_content(&photos[0].id).await.unwrap(), b"jpeg bytes");
        assert!(file.exists());
    }

    #[tokio::test]
    async fn delete_removes_source_after_import() {
        let (_lib_dir, library) = test_library().await;
        let executor = SerialExecutor::new(library.clone(), None);
        let src = tempfile::tempdir().unwrap();
        let file = src.path().join("a.png");
        tokio::fs::write(&file, b"png").await.unwrap();

        ImportFileTask::new(&file, false, true)
            .execute(&ctx(), &executor, library.as_ref())
            .await
            .unwrap();
        assert!(!file.exists());
        assert_eq!(library.find_all(SortOrder::Ascending).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dry_run_and_unsupported_files_change_nothing() {
        let (_lib_dir, library) = test_library().await;
        let executor = SerialExecutor::new(library.clone(), None);
        let src = tempfile::tempdir().unwrap();
        let photo = src.path().join("a.gif");
        let text = src.path().join("notes.txt");
        tokio::fs::write(&photo, b"gif").await.unwrap();
        tokio::fs::write(&text, b"hello").await.unwrap();

        ImportFileTask::new(&photo, true, true)
            .execute(&ctx(), &executor, library.as_ref())
            .await
            .unwrap();
        ImportFileTask::new(&text, false, true)
            .execute(&ctx(), &executor, library.as_ref())
            .await
            .unwrap();

        assert!(library.find_all(SortOrder::Ascending).await.unwrap().is_empty());
        assert!(photo.exists());
        assert!(text.exists());
    }

    #[tokio::test]
    async fn duplicate_content_is_reported() {
        let (_lib_dir, library) = test_library().await;
        let executor = SerialExecutor::new(library.clone(), None);
        let src = tempfile::tempdir().unwrap();
        let first = src.path().join("one.jpg");
        let second = src.path().join("two.jpg");
        tokio::fs::write(&first, b"same").await.unwrap();
        tokio::fs::write(&second, b"same").await.unwrap();

        ImportFileTask::new(&first, false, false)
            .execute(&ctx(), &executor, library.as_ref())
            .await
            .unwrap();
        let err = ImportFileTask::new(&second, false, true)
            .execute(&ctx(), &executor, library.as_ref())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Library(LibraryError::AlreadyExists(_))
        ));
        assert!(second.exists());
    }

    #[test]
    fn parameters_round_trip_through_configure() {
        let mut task = ImportFileTask::default();
        task.configure(json!({"path": "/tmp/x.jpg", "dryrun": true}))
            .unwrap();
        assert_eq!(task.path(), Path::new("/tmp/x.jpg"));
        assert_eq!(
            task.parameters(),
            json!({"path": "/tmp/x.jpg", "dryrun": true, "delete": false})
        );
        assert_eq!(task.describe(), "Importing file /tmp/x.jpg");
    }
}
