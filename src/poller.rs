//! Poll loop driving the collector
//!
//! Each cycle moves through
//! `Idle -> Fetching -> Draining -> Flushing -> Checkpointing -> Sleeping`:
//!
//! - Fetching: capture `until` once, fetch `[checkpoint, until]` into the queue
//! - Draining: wait until the writer task has written every queued record
//! - Flushing: rotate the temp file, hand it to the output sink, delete it
//! - Checkpointing: persist `until` as the new checkpoint
//!
//! Draining and Flushing are skipped when the window held no records, but the
//! checkpoint still advances. Any error ends the loop before the checkpoint
//! is touched, so a restart re-fetches the failed window.

use crate::client::{format_timestamp, FetchWindow, LogApiClient};
use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result};
use crate::fetcher::LogFetcher;
use crate::monitoring::{EventReporter, PollEvent};
use crate::queue::QueueProducer;
use crate::sink::OutputSink;
use crate::store::{Checkpoint, CheckpointStore};
use crate::writer::SharedWriter;
use chrono::{DateTime, SubsecRound, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Sleep between the end of one cycle and the start of the next
    pub schedule: Duration,
    /// Lower bound of the first window when no checkpoint exists
    pub start_time: Option<DateTime<Utc>>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            schedule: Duration::from_secs(crate::config::DEFAULT_SCHEDULE_SECS),
            start_time: None,
        }
    }
}

impl From<&CollectorConfig> for PollerConfig {
    fn from(config: &CollectorConfig) -> Self {
        Self {
            schedule: config.schedule,
            start_time: config.start_time,
        }
    }
}

/// Outcome of one successful cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub window: FetchWindow,
    pub record_count: usize,
    /// Temp file that was flushed and removed, if any records were fetched
    pub flushed_file: Option<PathBuf>,
}

pub struct LogPoller<C, S, O>
where
    C: LogApiClient + 'static,
    S: CheckpointStore,
    O: OutputSink,
{
    config: PollerConfig,
    fetcher: LogFetcher<C>,
    store: S,
    sink: O,
    writer: SharedWriter,
    queue: QueueProducer,
    reporter: EventReporter,
    checkpoint: Checkpoint,
}

impl<C, S, O> LogPoller<C, S, O>
where
    C: LogApiClient + 'static,
    S: CheckpointStore,
    O: OutputSink,
{
    pub fn new(
        config: PollerConfig,
        fetcher: LogFetcher<C>,
        store: S,
        sink: O,
        writer: SharedWriter,
        queue: QueueProducer,
    ) -> Self {
        Self {
            config,
            fetcher,
            store,
            sink,
            writer,
            queue,
            reporter: EventReporter::disabled(),
            checkpoint: Checkpoint::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: EventReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Checkpoint the next cycle starts from
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the persisted checkpoint, or start fresh if none exists
    pub async fn initialize_checkpoint(&mut self) -> Result<&Checkpoint> {
        if self.store.exists().await {
            match self.store.restore().await {
                Ok(checkpoint) => {
                    info!(
                        last_poll_timestamp = ?checkpoint.last_poll_timestamp,
                        "Retrieved existing checkpoint"
                    );
                    self.checkpoint = checkpoint;
                }
                Err(e) => {
                    error!(error = %e, "Error getting state");
                    return Err(e.into());
                }
            }
        } else {
            info!("No existing checkpoint found");
            self.checkpoint = Checkpoint::new();
        }
        Ok(&self.checkpoint)
    }

    /// Run cycles forever, sleeping `schedule` between them. Only returns on
    /// error.
    pub async fn run(mut self) -> Result<()> {
        self.initialize_checkpoint().await?;
        info!(schedule = ?self.config.schedule, "Starting poll loop");

        loop {
            self.run_cycle().await?;
            tokio::time::sleep(self.config.schedule).await;
        }
    }

    /// Run one cycle whose window ends now
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let now = Utc::now().trunc_subsecs(0);
        self.run_cycle_until(now).await
    }

    /// Run one cycle whose window ends at `until`
    #[instrument(skip(self))]
    pub async fn run_cycle_until(&mut self, until: DateTime<Utc>) -> Result<CycleReport> {
        let since = self
            .checkpoint
            .last_poll_timestamp
            .or(self.config.start_time);
        let window = FetchWindow::new(since, until);

        info!(since = ?since, "Getting data...");
        self.reporter.send(PollEvent::cycle_started(since, until));

        let record_count = self.fetcher.fetch_logs(&window, &self.queue).await?;

        let flushed_file = if record_count > 0 {
            Some(self.flush(&window).await?)
        } else {
            None
        };

        info!(record_count = record_count, "{} events processed...", record_count);

        let next = Checkpoint::at(until);
        self.store.save(&next).await?;
        self.checkpoint = next;
        debug!(checkpoint = %format_timestamp(&until), "Checkpoint advanced");

        self.reporter.send(PollEvent::cycle_completed(
            record_count,
            until,
            flushed_file.is_some(),
        ));

        Ok(CycleReport {
            window,
            record_count,
            flushed_file,
        })
    }

    /// Wait for the writer, rotate the temp file and ship it to the sink
    async fn flush(&self, window: &FetchWindow) -> Result<PathBuf> {
        debug!(pending = self.queue.pending(), "Waiting for queue to drain");
        self.queue.wait_drained().await?;

        let path = self
            .writer
            .lock()
            .await
            .rotate()
            .await
            .map_err(CollectorError::TempFile)?;

        let label = format_timestamp(&window.until);
        if let Err(e) = self.sink.write(&path, &label).await {
            error!(path = %path.display(), error = %e, "Unable to write to output");
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::remove_file(&path).await {
            error!(path = %path.display(), error = %e, "Unable to remove tmp file");
            return Err(CollectorError::TempFile(e));
        }

        debug!(path = %path.display(), label = %label, "Flushed batch");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::{MonitoringConfig, PollEventType};
    use crate::queue;
    use crate::store::InMemoryCheckpointStore;
    use crate::test::mocks::{MockCheckpointStore, MockLogClient, MockOutputSink};
    use crate::test::TestUtils;
    use crate::writer::{spawn_consumer, TempFileWriter};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::Once;
    use tracing_subscriber::EnvFilter;

    static INIT: Once = Once::new();

    fn init_logging() {
        INIT.call_once(|| {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::from_default_env()
                        .add_directive("audit_log_collector=debug".parse().unwrap()),
                )
                .with_test_writer()
                .try_init()
                .ok();
        });
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 30).unwrap()
    }

    struct Harness<S: CheckpointStore> {
        poller: LogPoller<MockLogClient, S, MockOutputSink>,
        sink: MockOutputSink,
        writer: SharedWriter,
        _tmp: tempfile::TempDir,
    }

    async fn harness<S: CheckpointStore>(client: MockLogClient, store: S) -> Harness<S> {
        init_logging();
        let tmp = tempfile::tempdir().unwrap();
        let writer = TempFileWriter::new(tmp.path()).await.unwrap().shared();
        let (producer, consumer) = queue::bounded(4);
        spawn_consumer(consumer, writer.clone());

        let sink = MockOutputSink::new();
        let poller = LogPoller::new(
            PollerConfig::default(),
            LogFetcher::new(client, 1000),
            store,
            sink.clone(),
            writer.clone(),
            producer,
        );

        Harness {
            poller,
            sink,
            writer,
            _tmp: tmp,
        }
    }

    #[tokio::test]
    async fn test_cycle_flushes_records_and_advances_checkpoint() -> anyhow::Result<()> {
        let client = MockLogClient::new();
        client
            .mock_page(Ok(TestUtils::create_page(&["A", "B"], Some("x"))))
            .await;
        client
            .mock_page(Ok(TestUtils::create_page(&["C"], None)))
            .await;
        let store = InMemoryCheckpointStore::with_checkpoint(Checkpoint::at(t0()));

        let mut h = harness(client, store).await;
        h.poller.initialize_checkpoint().await?;
        let report = h.poller.run_cycle_until(t1()).await?;

        assert_eq!(report.record_count, 3);
        assert_eq!(report.window, FetchWindow::new(Some(t0()), t1()));

        let writes = h.sink.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].label, "2024-03-01T10:00:30Z");
        assert_eq!(
            writes[0].contents,
            "{\"uuid\":\"A\"}\n{\"uuid\":\"B\"}\n{\"uuid\":\"C\"}\n"
        );

        // Temp file was removed after the sink accepted it
        let flushed = report.flushed_file.unwrap();
        assert!(!flushed.exists());

        assert_eq!(h.poller.store().current().await, Some(Checkpoint::at(t1())));
        assert_eq!(h.poller.checkpoint(), &Checkpoint::at(t1()));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_event_cycle_still_advances_checkpoint() -> anyhow::Result<()> {
        let client = MockLogClient::new();
        client.mock_page(Ok(TestUtils::create_page(&[], None))).await;
        let store = InMemoryCheckpointStore::with_checkpoint(Checkpoint::at(t0()));

        let mut h = harness(client, store).await;
        h.poller.initialize_checkpoint().await?;
        let report = h.poller.run_cycle_until(t1()).await?;

        assert_eq!(report.record_count, 0);
        assert_eq!(report.flushed_file, None);
        assert!(h.sink.writes().await.is_empty());
        assert_eq!(h.writer.lock().await.last_file_path(), None);
        assert_eq!(h.poller.store().current().await, Some(Checkpoint::at(t1())));
        Ok(())
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_previous_checkpoint() -> anyhow::Result<()> {
        let client = MockLogClient::new();
        client
            .mock_page(Ok(TestUtils::create_page(&["A"], None)))
            .await;
        let store = InMemoryCheckpointStore::with_checkpoint(Checkpoint::at(t0()));

        let mut h = harness(client, store).await;
        h.sink.fail_writes(true);
        h.poller.initialize_checkpoint().await?;

        let result = h.poller.run_cycle_until(t1()).await;

        assert!(matches!(result, Err(CollectorError::Sink(_))));
        assert_eq!(h.poller.store().current().await, Some(Checkpoint::at(t0())));
        assert_eq!(h.poller.checkpoint(), &Checkpoint::at(t0()));

        // The rotated batch is left on disk for the next attempt
        let leftover = h.writer.lock().await.last_file_path().map(|p| p.to_path_buf());
        assert!(leftover.unwrap().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_checkpoint() -> anyhow::Result<()> {
        let client = MockLogClient::new();
        client
            .mock_page(Ok(TestUtils::create_page(&["A"], Some("x"))))
            .await;
        client
            .mock_page(Err(crate::error::ClientError::RateLimitExhausted { attempts: 7 }))
            .await;
        let store = InMemoryCheckpointStore::with_checkpoint(Checkpoint::at(t0()));

        let mut h = harness(client, store).await;
        h.poller.initialize_checkpoint().await?;

        let result = h.poller.run_cycle_until(t1()).await;

        assert!(matches!(result, Err(CollectorError::Fetch(_))));
        assert_eq!(h.poller.store().current().await, Some(Checkpoint::at(t0())));
        assert!(h.sink.writes().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_checkpoint_save_failure_is_fatal() -> anyhow::Result<()> {
        let client = MockLogClient::new();
        client.mock_page(Ok(TestUtils::create_page(&[], None))).await;
        let store = MockCheckpointStore::new();
        store
            .mock_save(Err(crate::error::CheckpointError::SaveFailed(
                "read-only file system".to_string(),
            )))
            .await;

        let mut h = harness(client, store).await;
        h.poller.initialize_checkpoint().await?;

        let result = h.poller.run_cycle_until(t1()).await;
        assert!(matches!(result, Err(CollectorError::Checkpoint(_))));
        assert_eq!(h.poller.checkpoint(), &Checkpoint::new());
        assert_eq!(h.poller.store().save_count().await, 1);
        assert_eq!(h.poller.store().saved().await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_failure_stops_before_fetching() -> anyhow::Result<()> {
        let client = MockLogClient::new();
        let store = MockCheckpointStore::new();
        store
            .mock_restore(Err(crate::error::CheckpointError::InvalidData(
                "truncated state".to_string(),
            )))
            .await;

        let mut h = harness(client, store).await;
        let result = h.poller.initialize_checkpoint().await;

        assert!(matches!(result, Err(CollectorError::Checkpoint(_))));
        assert_eq!(h.poller.fetcher.client().request_count(), 0);
        assert_eq!(h.poller.store().save_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_restored_checkpoint_bounds_first_window() -> anyhow::Result<()> {
        let client = MockLogClient::new();
        let store = MockCheckpointStore::new();
        store.mock_restore(Ok(Checkpoint::at(t0()))).await;

        let mut h = harness(client, store).await;
        h.poller.initialize_checkpoint().await?;
        let report = h.poller.run_cycle_until(t1()).await?;

        assert_eq!(report.window, FetchWindow::new(Some(t0()), t1()));
        assert_eq!(h.poller.store().saved().await, Some(Checkpoint::at(t1())));
        Ok(())
    }

    #[tokio::test]
    async fn test_first_run_uses_configured_start_time() -> anyhow::Result<()> {
        let client = MockLogClient::new();
        let mut h = harness(client, InMemoryCheckpointStore::new()).await;
        h.poller.config.start_time = Some(t0());

        h.poller.initialize_checkpoint().await?;
        assert_eq!(h.poller.checkpoint(), &Checkpoint::new());

        let report = h.poller.run_cycle_until(t1()).await?;
        assert_eq!(report.window.since, Some(t0()));
        Ok(())
    }

    #[tokio::test]
    async fn test_first_run_without_start_time_omits_since() -> anyhow::Result<()> {
        let client = MockLogClient::new();
        let mut h = harness(client, InMemoryCheckpointStore::new()).await;
        h.poller.initialize_checkpoint().await?;

        let report = h.poller.run_cycle_until(t1()).await?;
        assert_eq!(report.window.since, None);
        assert_eq!(h.poller.fetcher.client().windows().await[0].since, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_consecutive_cycles_chain_windows() -> anyhow::Result<()> {
        let client = MockLogClient::new();
        client
            .mock_page(Ok(TestUtils::create_page(&["A"], None)))
            .await;
        client
            .mock_page(Ok(TestUtils::create_page(&["B"], None)))
            .await;
        let store = InMemoryCheckpointStore::with_checkpoint(Checkpoint::at(t0()));
        let t2 = t1() + chrono::Duration::seconds(30);

        let mut h = harness(client, store).await;
        let (reporter, rx) = EventReporter::new(&MonitoringConfig {
            enabled: true,
            channel_size: 64,
        });
        let mut rx = rx.unwrap();
        h.poller = h.poller.with_reporter(reporter);
        h.poller.initialize_checkpoint().await?;

        h.poller.run_cycle_until(t1()).await?;
        h.poller.run_cycle_until(t2).await?;

        let windows = h.poller.fetcher.client().windows().await;
        assert_eq!(
            windows,
            vec![
                FetchWindow::new(Some(t0()), t1()),
                FetchWindow::new(Some(t1()), t2),
            ]
        );

        let labels: Vec<String> = h.sink.writes().await.into_iter().map(|w| w.label).collect();
        assert_eq!(labels, vec!["2024-03-01T10:00:30Z", "2024-03-01T10:01:00Z"]);

        let mut completed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PollEventType::CycleCompleted { checkpoint, .. } = event.event_type {
                completed.push(checkpoint);
            }
        }
        assert_eq!(completed, vec![t1(), t2]);
        Ok(())
    }
}
