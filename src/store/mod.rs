//! Checkpoint storage for the collector
//!
//! A checkpoint records the upper bound of the last fully flushed fetch
//! window. The poll loop loads it once at startup and saves it after every
//! successful cycle.

use crate::error::CheckpointError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub mod file;
pub mod memory;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;

/// Last successfully processed point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// `None` until the first cycle completes
    #[serde(default, deserialize_with = "empty_as_none")]
    pub last_poll_timestamp: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// A checkpoint with no prior timestamp
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            last_poll_timestamp: Some(timestamp),
        }
    }
}

/// Accepts `null`, a missing field, or `""` as "no timestamp"
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

/// Trait for checkpoint storage implementations
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Whether a checkpoint has been persisted before
    async fn exists(&self) -> bool;

    /// Load the persisted checkpoint
    async fn restore(&self) -> Result<Checkpoint, CheckpointError>;

    /// Persist `checkpoint`, replacing any previous one
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}
