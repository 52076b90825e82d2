//! Bounded event queue between the fetcher and the temp-file writer
//!
//! A single-producer/single-consumer FIFO with fixed capacity. Pushing into a
//! full queue waits for the consumer, so HTTP fetching is paced by disk
//! writes and no record is ever dropped.
//!
//! Besides the channel itself the queue tracks how many records have been
//! pushed but not yet acknowledged as written. [`QueueProducer::wait_drained`]
//! waits for that count to reach zero; the poll loop uses it as the barrier
//! before rotating the temp file.

use crate::error::QueueError;
use crate::record::LogRecord;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::trace;

/// Create a bounded queue holding at most `capacity` records
///
/// # Panics
///
/// Panics if `capacity` is zero. [`crate::config::CollectorConfig::validate`]
/// rejects such a configuration.
pub fn bounded(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    let (pending_tx, pending_rx) = watch::channel(0usize);
    let pending = Arc::new(pending_tx);

    (
        QueueProducer {
            tx,
            pending: pending.clone(),
            pending_rx,
        },
        QueueConsumer { rx, pending },
    )
}

/// Sending half of the queue, owned by the poll loop
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<LogRecord>,
    pending: Arc<watch::Sender<usize>>,
    pending_rx: watch::Receiver<usize>,
}

impl QueueProducer {
    /// Append a record, waiting while the queue is full
    pub async fn push(&self, record: LogRecord) -> Result<(), QueueError> {
        // Reserving first keeps the pending count exact even if this future
        // is dropped while waiting for capacity
        let permit = self.tx.reserve().await.map_err(|_| QueueError::Closed)?;
        self.pending.send_modify(|n| *n += 1);
        permit.send(record);
        Ok(())
    }

    /// Records currently buffered in the channel
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Records pushed but not yet acknowledged by the consumer
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until every pushed record has been acknowledged
    pub async fn wait_drained(&self) -> Result<(), QueueError> {
        let mut rx = self.pending_rx.clone();
        trace!(pending = *rx.borrow(), "Waiting for queue to drain");
        rx.wait_for(|pending| *pending == 0)
            .await
            .map(|_| ())
            .map_err(|_| QueueError::Closed)
    }
}

/// Receiving half of the queue, owned by the writer task
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<LogRecord>,
    pending: Arc<watch::Sender<usize>>,
}

impl QueueConsumer {
    /// Take the next record, waiting while the queue is empty. Returns `None`
    /// once every producer is gone and the queue is empty.
    pub async fn pop(&mut self) -> Option<LogRecord> {
        self.rx.recv().await
    }

    /// Mark a popped record as fully handled
    pub fn ack(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}
