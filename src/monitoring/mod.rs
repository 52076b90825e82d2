//! Monitoring events emitted by the poll loop and fetcher
//!
//! Monitoring is opt-in. When enabled, the collector publishes a
//! [`PollEvent`] for each cycle boundary, fetched page and rate-limit wait.
//! Publishing never blocks the pipeline.

mod types;

pub use types::{EventReporter, MonitoringConfig, PollEvent, PollEventType};
