use crate::error::CheckpointError;
use crate::store::{Checkpoint, CheckpointStore};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace};

/// In-memory implementation of checkpoint storage
#[derive(Debug, Default, Clone)]
pub struct InMemoryCheckpointStore {
    checkpoint: Arc<RwLock<Option<Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        debug!("Initializing in-memory checkpoint store");
        Self::default()
    }

    /// Store pre-seeded with `checkpoint`
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            checkpoint: Arc::new(RwLock::new(Some(checkpoint))),
        }
    }

    /// Current contents without going through `restore`
    pub async fn current(&self) -> Option<Checkpoint> {
        self.checkpoint.read().await.clone()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn exists(&self) -> bool {
        self.checkpoint.read().await.is_some()
    }

    #[instrument(skip(self))]
    async fn restore(&self) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = self
            .checkpoint
            .read()
            .await
            .clone()
            .ok_or_else(|| CheckpointError::RetrieveFailed("no checkpoint stored".to_string()))?;

        trace!(checkpoint = ?checkpoint, "Retrieved checkpoint from memory");
        Ok(checkpoint)
    }

    #[instrument(skip(self))]
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        *self.checkpoint.write().await = Some(checkpoint.clone());
        debug!(checkpoint = ?checkpoint, "Checkpoint saved to memory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_save_and_restore() -> anyhow::Result<()> {
        let store = InMemoryCheckpointStore::new();
        assert!(!store.exists().await);
        assert!(store.restore().await.is_err());

        let checkpoint = Checkpoint::at(Utc::now());
        store.save(&checkpoint).await?;

        assert!(store.exists().await);
        assert_eq!(store.restore().await?, checkpoint);
        Ok(())
    }
}
