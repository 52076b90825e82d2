//! Output sinks for flushed batches

use crate::error::SinkError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

/// Destination for a finished batch file
///
/// `label` identifies the batch. The poll loop passes the RFC3339 upper bound
/// of the fetch window it belongs to.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Durably write or forward the contents of `path`. Returning `Ok` means
    /// the caller may delete `path`.
    async fn write(&self, path: &Path, label: &str) -> Result<(), SinkError>;
}

/// Copies every batch into a directory as `<label>.log`
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target path for a label. Characters that are awkward in file names are
    /// replaced.
    pub fn target_path(&self, label: &str) -> PathBuf {
        let name: String = label
            .chars()
            .map(|c| match c {
                ':' | '/' | '\\' => '-',
                c => c,
            })
            .collect();
        self.dir.join(format!("{name}.log"))
    }
}

#[async_trait]
impl OutputSink for DirectorySink {
    #[instrument(skip(self))]
    async fn write(&self, path: &Path, label: &str) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir).await?;
        let target = self.target_path(label);

        let bytes = fs::copy(path, &target).await?;
        fs::File::open(&target).await?.sync_all().await?;

        debug!(target = %target.display(), bytes = bytes, "Wrote batch to output directory");
        Ok(())
    }
}
