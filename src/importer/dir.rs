//! `importDir` task: fans a directory tree out into `importFile` tasks.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::TaskError;
use crate::importer::{ImportFileTask, SKIPPED_DIRS};
use crate::library::PhotoLibrary;
use crate::tasks::{Task, TaskContext, TaskExecutor, decode_parameters, encode_parameters};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ImportDirParams {
    #[serde(default)]
    importdir: PathBuf,
    #[serde(default)]
    dryrun: bool,
}

#[derive(Debug, Default)]
pub struct ImportDirTask {
    params: ImportDirParams,
}

impl ImportDirTask {
    pub const KIND: &'static str = "importDir";

    pub fn new(dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            params: ImportDirParams {
                importdir: dir.into(),
                dryrun: dry_run,
            },
        }
    }

    async fn submit_file(&self, executor: &dyn TaskExecutor, path: PathBuf) -> crate::Result<()> {
        let task = ImportFileTask::new(path, self.params.dryrun, false);
        executor.submit(Box::new(task)).await?;
        Ok(())
    }
}

fn is_skipped(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

#[async_trait]
impl Task for ImportDirTask {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn describe(&self) -> String {
        if self.params.dryrun {
            format!("Dry-run import directory {}", self.params.importdir.display())
        } else {
            format!("Importing photos from {}", self.params.importdir.display())
        }
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
        executor: &dyn TaskExecutor,
        _library: &dyn PhotoLibrary,
    ) -> crate::Result<()> {
        let root = &self.params.importdir;
        info!(dir = %root.display(), "Importing photos");

        if !tokio::fs::metadata(root).await?.is_dir() {
            self.submit_file(executor, root.clone()).await?;
            info!(count = 1, "Import finished");
            return Ok(());
        }

        let mut count = 0usize;
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            ctx.check_cancelled()?;
            debug!(dir = %dir.display(), "Entering dir");

            let mut entries = Vec::new();
            let mut reader = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = reader.next_entry().await? {
                entries.push((entry.path(), entry.file_type().await?));
            }
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut subdirs = Vec::new();
            for (path, file_type) in entries {
                if file_type.is_dir() {
                    if path.file_name().is_some_and(is_skipped) {
                        debug!(dir = %path.display(), "Skipping dir");
                    } else {
                        subdirs.push(path);
                    }
                    continue;
                }
                ctx.check_cancelled()?;
                self.submit_file(executor, path).await?;
                count += 1;
            }
            // Reversed so subdirectories are visited in name order.
            pending.extend(subdirs.into_iter().rev());
        }

        info!(count, "Import finished");
        Ok(())
    }
}
