//! Error types for the audit-log collector

use reqwest::StatusCode;
use thiserror::Error;
use tokio::task::JoinError;

/// Main error type for collector operations
///
/// Every variant is fatal for the running process: a cycle is never retried
/// and the checkpoint is never advanced past a failed cycle.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Failed to fetch logs: {0}")]
    Fetch(#[from] ClientError),

    #[error("Event queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Output sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Temp file error: {0}")]
    TempFile(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Consumer task failed: {0}")]
    Consumer(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CollectorError {
    /// Name of the pipeline stage that produced the error
    pub fn stage(&self) -> &'static str {
        match self {
            CollectorError::Fetch(_) => "fetch",
            CollectorError::Queue(_) => "queue",
            CollectorError::Checkpoint(_) => "checkpoint",
            CollectorError::Sink(_) => "sink",
            CollectorError::TempFile(_) => "temp_file",
            CollectorError::Config(_) => "config",
            CollectorError::Consumer(_) => "consumer",
            CollectorError::Other(_) => "other",
        }
    }
}

impl From<JoinError> for CollectorError {
    fn from(err: JoinError) -> Self {
        CollectorError::Consumer(err.to_string())
    }
}

/// Result type for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Errors raised by a single page request against the log API
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected HTTP response code: {status}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("Still rate limited after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("Error unmarshalling response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request header: {0}")]
    InvalidHeader(String),
}

impl ClientError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::RateLimitExhausted { .. })
    }
}

/// Error type for the bounded event queue
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Event queue closed by consumer")]
    Closed,
}

/// Error type for checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to save checkpoint: {0}")]
    SaveFailed(String),

    #[error("Failed to retrieve checkpoint: {0}")]
    RetrieveFailed(String),

    #[error("Invalid checkpoint data: {0}")]
    InvalidData(String),

    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for output sink writes
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write to output: {0}")]
    Write(String),

    #[error("Output I/O error: {0}")]
    Io(#[from] std::io::Error),
}
