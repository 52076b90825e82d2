// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::Result;
use audit_log_collector::writer::{spawn_consumer, TempFileWriter};
use audit_log_collector::{
    queue, BackoffConfig, CollectorConfig, DirectorySink, FileCheckpointStore, HttpLogClient,
    LogFetcher, LogPoller, PollerConfig,
};
use chrono::{DateTime, TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;
use tempfile::TempDir;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("audit_log_collector=debug".parse().unwrap()),
            )
            .with_test_writer()
            .with_line_number(true)
            .try_init()
            .ok();
    });
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

pub fn t1() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 30).unwrap()
}

/// Millisecond-scale backoff so rate-limit tests finish quickly
pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        multiplier: 2,
    }
}

pub type HttpPoller = LogPoller<HttpLogClient, FileCheckpointStore, DirectorySink>;

/// A poller wired to real components, with every directory under one temp dir
pub struct TestContext {
    pub config: CollectorConfig,
    pub poller: HttpPoller,
    _root: TempDir,
}

impl TestContext {
    pub async fn new(server_url: &str) -> Result<Self> {
        Self::with_config(server_url, |_| {}).await
    }

    pub async fn with_config(
        server_url: &str,
        customize: impl FnOnce(&mut CollectorConfig),
    ) -> Result<Self> {
        init_logging();
        let root = tempfile::tempdir()?;

        let mut config = CollectorConfig {
            domain: server_url.to_string(),
            api_token: "test-token".to_string(),
            state_path: root.path().join("state").join("state.json"),
            tmp_dir: root.path().join("tmp"),
            output_dir: root.path().join("output"),
            queue_capacity: 4,
            page_limit: 2,
            http_timeout: Duration::from_secs(5),
            backoff: fast_backoff(),
            ..CollectorConfig::default()
        };
        customize(&mut config);
        config.validate()?;

        let client = HttpLogClient::from_config(&config)?;
        let fetcher = LogFetcher::new(client, config.page_limit);
        let store = FileCheckpointStore::new(&config.state_path);
        let sink = DirectorySink::new(&config.output_dir);

        let writer = TempFileWriter::new(&config.tmp_dir).await?.shared();
        let (producer, consumer) = queue::bounded(config.queue_capacity);
        spawn_consumer(consumer, writer.clone());

        let poller = LogPoller::new(
            PollerConfig::from(&config),
            fetcher,
            store,
            sink,
            writer,
            producer,
        );

        Ok(Self {
            config,
            poller,
            _root: root,
        })
    }

    pub async fn write_state(&self, json: &str) -> Result<()> {
        if let Some(parent) = self.config.state_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.config.state_path, json).await?;
        Ok(())
    }

    pub async fn read_state(&self) -> Result<serde_json::Value> {
        let raw = tokio::fs::read_to_string(&self.config.state_path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn output_file(&self, name: &str) -> PathBuf {
        self.config.output_dir.join(name)
    }

    /// Names of the files currently in the output directory
    pub async fn output_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.config.output_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Number of files currently in the temp directory
    pub async fn tmp_file_count(&self) -> Result<usize> {
        let mut count = 0;
        let mut entries = tokio::fs::read_dir(&self.config.tmp_dir).await?;
        while entries.next_entry().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}
