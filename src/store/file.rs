use crate::error::CheckpointError;
use crate::store::{Checkpoint, CheckpointStore};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Checkpoint persisted as a small JSON document on disk
///
/// Saves write a sibling `.tmp` file and rename it over the target, so a
/// crash mid-save leaves the previous checkpoint intact.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    /// Only a missing file counts as "no checkpoint". Any other metadata error
    /// reports `true` so that `restore` surfaces it instead of starting over.
    async fn exists(&self) -> bool {
        match fs::metadata(&self.path).await {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unable to inspect checkpoint file");
                true
            }
        }
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn restore(&self) -> Result<Checkpoint, CheckpointError> {
        let contents = fs::read(&self.path).await.map_err(|e| {
            CheckpointError::RetrieveFailed(format!("{}: {e}", self.path.display()))
        })?;
        let checkpoint: Checkpoint = serde_json::from_slice(&contents)
            .map_err(|e| CheckpointError::InvalidData(format!("{}: {e}", self.path.display())))?;

        debug!(checkpoint = ?checkpoint, "Restored checkpoint");
        Ok(checkpoint)
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let contents = serde_json::to_vec(checkpoint)
            .map_err(|e| CheckpointError::SaveFailed(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let staging = self.staging_path();
        let mut file = fs::File::create(&staging).await?;
        file.write_all(&contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&staging, &self.path).await?;

        debug!(checkpoint = ?checkpoint, "Saved checkpoint");
        Ok(())
    }
}
