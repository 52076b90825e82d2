use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

/// Configuration for the monitoring system
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Whether monitoring is enabled
    pub enabled: bool,
    /// Size of the monitoring channel buffer
    pub channel_size: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_size: 1000,
        }
    }
}

/// A monitoring event from the collector
#[derive(Debug, Clone)]
pub struct PollEvent {
    /// When the event occurred
    pub timestamp: SystemTime,
    /// The type of event and its details
    pub event_type: PollEventType,
}

/// The different types of events that can occur while polling
#[derive(Debug, Clone, PartialEq)]
pub enum PollEventType {
    CycleStarted {
        since: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    },
    PageFetched {
        page: u32,
        record_count: usize,
        has_next: bool,
    },
    RateLimited {
        attempt: u32,
        delay: Duration,
    },
    CycleCompleted {
        record_count: usize,
        checkpoint: DateTime<Utc>,
        flushed: bool,
    },
}

impl PollEvent {
    fn now(event_type: PollEventType) -> Self {
        Self {
            timestamp: SystemTime::now(),
            event_type,
        }
    }

    pub fn cycle_started(since: Option<DateTime<Utc>>, until: DateTime<Utc>) -> Self {
        Self::now(PollEventType::CycleStarted { since, until })
    }

    pub fn page_fetched(page: u32, record_count: usize, has_next: bool) -> Self {
        Self::now(PollEventType::PageFetched {
            page,
            record_count,
            has_next,
        })
    }

    pub fn rate_limited(attempt: u32, delay: Duration) -> Self {
        Self::now(PollEventType::RateLimited { attempt, delay })
    }

    pub fn cycle_completed(record_count: usize, checkpoint: DateTime<Utc>, flushed: bool) -> Self {
        Self::now(PollEventType::CycleCompleted {
            record_count,
            checkpoint,
            flushed,
        })
    }
}

/// Cheap handle for publishing monitoring events
#[derive(Debug, Clone, Default)]
pub struct EventReporter {
    tx: Option<mpsc::Sender<PollEvent>>,
}

impl EventReporter {
    /// Build a reporter and, if monitoring is enabled, the receiving end
    pub fn new(config: &MonitoringConfig) -> (Self, Option<mpsc::Receiver<PollEvent>>) {
        if config.enabled {
            let (tx, rx) = mpsc::channel(config.channel_size);
            (Self { tx: Some(tx) }, Some(rx))
        } else {
            (Self::disabled(), None)
        }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Publishes an event if monitoring is enabled
    pub fn send(&self, event: PollEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => trace!("Sent monitoring event successfully"),
            Err(TrySendError::Full(event)) => {
                warn!(event = ?event.event_type, "Monitoring channel full, dropping event")
            }
            Err(TrySendError::Closed(_)) => trace!("Monitoring receiver dropped"),
        }
    }
}
