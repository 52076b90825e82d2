//! Paginated fetching of one time window
//!
//! [`LogFetcher::fetch_logs`] walks every page of a [`FetchWindow`] and pushes
//! each record onto the event queue as soon as its page arrives, so the full
//! result set is never held in memory. Server order is preserved across
//! pages.

use crate::client::{FetchWindow, LogApiClient};
use crate::error::{CollectorError, Result};
use crate::monitoring::{EventReporter, PollEvent};
use crate::queue::QueueProducer;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct LogFetcher<C>
where
    C: LogApiClient + 'static,
{
    client: Arc<C>,
    page_limit: u32,
    reporter: EventReporter,
}

impl<C> LogFetcher<C>
where
    C: LogApiClient + 'static,
{
    pub fn new(client: C, page_limit: u32) -> Self {
        Self {
            client: Arc::new(client),
            page_limit,
            reporter: EventReporter::disabled(),
        }
    }

    pub fn with_reporter(mut self, reporter: EventReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetch all pages of `window` into `queue` and return the record count
    ///
    /// Pagination stops at the first page without a usable next cursor. Any
    /// request or decode error aborts the whole fetch; records already pushed
    /// stay in the queue.
    #[instrument(skip(self, queue), fields(since = ?window.since, until = %window.until))]
    pub async fn fetch_logs(&self, window: &FetchWindow, queue: &QueueProducer) -> Result<usize> {
        let mut count = 0;
        let mut page_number = 0u32;
        let mut after: Option<String> = None;

        loop {
            page_number += 1;
            let page = self
                .client
                .get_logs_page(window, self.page_limit, after.as_deref())
                .await
                .map_err(CollectorError::Fetch)?;

            let page_len = page.records.len();
            for record in page.records {
                queue.push(record).await?;
            }
            count += page_len;

            let has_next = page.next_cursor.is_some();
            debug!(
                page = page_number,
                records = page_len,
                total = count,
                has_next = has_next,
                "Processed page"
            );
            self.reporter
                .send(PollEvent::page_fetched(page_number, page_len, has_next));

            match page.next_cursor {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        Ok(count)
    }
}
