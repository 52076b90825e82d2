//! Audit Log Collector - incremental polling of a paginated audit-log API
//!
//! Every cycle fetches the window between the last checkpoint and "now",
//! streams the records through a bounded queue into a temp file, hands the
//! finished file to an output sink and only then advances the checkpoint.

pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod monitoring;
pub mod pagination;
pub mod poller;
pub mod queue;
pub mod record;
pub mod retry;
pub mod sink;
pub mod store;
pub mod writer;

// Make test utilities available for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test;

pub use client::{FetchWindow, HttpLogClient, LogApiClient, LogPage};
pub use config::{Cli, CollectorConfig};
pub use error::{CollectorError, Result};
pub use fetcher::LogFetcher;
pub use poller::{CycleReport, LogPoller, PollerConfig};
pub use record::LogRecord;
pub use retry::{Backoff, BackoffConfig, RateLimitBackoff};

// Re-export main traits
pub use crate::sink::OutputSink;
pub use crate::store::CheckpointStore;

// Re-export implementations
pub use crate::sink::DirectorySink;
pub use crate::store::{FileCheckpointStore, InMemoryCheckpointStore};
