//! Temp-file writer fed by the event queue
//!
//! The consumer task appends every record it pops to the currently open temp
//! file. At the end of a cycle the poll loop rotates the writer: the current
//! file is flushed and closed, a fresh file takes its place, and the closed
//! file is handed to the output sink.

use crate::error::CollectorError;
use crate::queue::QueueConsumer;
use crate::record::LogRecord;
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

/// Writer shared by the consumer task (appends) and the poll loop (rotation)
pub type SharedWriter = Arc<Mutex<TempFileWriter>>;

static FILE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

const FILE_PREFIX: &str = "collector-";
const FILE_SUFFIX: &str = ".log";

/// Appends records to a rotating temp file
#[derive(Debug)]
pub struct TempFileWriter {
    dir: PathBuf,
    current_path: PathBuf,
    file: BufWriter<File>,
    lines_written: u64,
    last_file_path: Option<PathBuf>,
}

impl TempFileWriter {
    /// Create `dir` if needed and open the first temp file in it
    pub async fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Self::remove_stale(&dir).await?;
        let (current_path, file) = Self::open_new(&dir).await?;
        debug!(path = %current_path.display(), "Opened temp file");

        Ok(Self {
            dir,
            current_path,
            file,
            lines_written: 0,
            last_file_path: None,
        })
    }

    pub fn shared(self) -> SharedWriter {
        Arc::new(Mutex::new(self))
    }

    /// Delete temp files left by earlier runs. Their windows were never
    /// checkpointed, so the next cycle fetches those records again.
    async fn remove_stale(dir: &Path) -> io::Result<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            fs::remove_file(entry.path()).await?;
            debug!(path = %entry.path().display(), "Removed stale temp file");
            removed += 1;
        }
        if removed > 0 {
            warn!(
                dir = %dir.display(),
                removed = removed,
                "Removed temp files from a previous run"
            );
        }
        Ok(removed)
    }

    async fn open_new(dir: &Path) -> io::Result<(PathBuf, BufWriter<File>)> {
        let name = format!(
            "{FILE_PREFIX}{}-{}-{}{FILE_SUFFIX}",
            std::process::id(),
            Utc::now().format("%Y%m%dT%H%M%S%.6f"),
            FILE_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        let path = dir.join(name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok((path, BufWriter::new(file)))
    }

    /// Append one record as a single line
    pub async fn write_log(&mut self, record: &LogRecord) -> io::Result<()> {
        self.file.write_all(record.as_str().as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.lines_written += 1;
        trace!(lines = self.lines_written, "Wrote record to temp file");
        Ok(())
    }

    /// Close the current file, open a new one and return the closed file's path
    pub async fn rotate(&mut self) -> io::Result<PathBuf> {
        self.file.flush().await?;
        self.file.get_ref().sync_all().await?;

        let (next_path, next_file) = Self::open_new(&self.dir).await?;
        let closed_path = std::mem::replace(&mut self.current_path, next_path);
        let mut closed_file = std::mem::replace(&mut self.file, next_file);
        closed_file.shutdown().await?;

        debug!(
            closed = %closed_path.display(),
            lines = self.lines_written,
            opened = %self.current_path.display(),
            "Rotated temp file"
        );

        self.lines_written = 0;
        self.last_file_path = Some(closed_path.clone());
        Ok(closed_path)
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    /// Path of the file closed by the most recent rotation
    pub fn last_file_path(&self) -> Option<&Path> {
        self.last_file_path.as_deref()
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }
}

/// Spawn the consumer task: pop records and append them to the temp file
/// until the queue closes. A write failure ends the task with an error.
pub fn spawn_consumer(
    mut consumer: QueueConsumer,
    writer: SharedWriter,
) -> JoinHandle<Result<(), CollectorError>> {
    tokio::spawn(async move {
        while let Some(record) = consumer.pop().await {
            if let Err(e) = writer.lock().await.write_log(&record).await {
                error!(error = %e, "Unable to write to temp file");
                return Err(CollectorError::TempFile(e));
            }
            consumer.ack();
        }
        debug!("Event queue closed, consumer exiting");
        Ok(())
    })
}
