//! HTTP access to the audit-log API
//!
//! [`LogApiClient`] fetches exactly one page per call. Walking the pages is
//! the job of [`crate::fetcher::LogFetcher`].

use crate::config::CollectorConfig;
use crate::error::ClientError;
use crate::monitoring::EventReporter;
use crate::pagination::{next_cursor, CURSOR_PARAM};
use crate::record::{records_from_body, LogRecord};
use crate::retry::{execute_with_backoff, BackoffConfig, RateLimitBackoff};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, instrument};

/// Path of the system log endpoint
pub const LOGS_PATH: &str = "/api/v1/logs";

/// Time range queried during one fetch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// Lower bound. `None` lets the API apply its default range.
    pub since: Option<DateTime<Utc>>,
    /// Upper bound, captured once when the cycle starts
    pub until: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(since: Option<DateTime<Utc>>, until: DateTime<Utc>) -> Self {
        Self { since, until }
    }
}

/// Format a timestamp the way the API expects it in query strings
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// One page of decoded records plus the cursor for the following page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPage {
    pub records: Vec<LogRecord>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait LogApiClient: Send + Sync {
    /// Fetch a single page of the window, starting after `after` if given
    async fn get_logs_page(
        &self,
        window: &FetchWindow,
        limit: u32,
        after: Option<&str>,
    ) -> Result<LogPage, ClientError>;
}

/// [`LogApiClient`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpLogClient {
    base_url: Url,
    authorization: String,
    http: reqwest::Client,
    backoff: BackoffConfig,
    reporter: EventReporter,
}

impl HttpLogClient {
    pub fn new(
        base_url: &str,
        auth_scheme: &str,
        token: &str,
        timeout: Duration,
        backoff: BackoffConfig,
    ) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            authorization: format!("{auth_scheme} {token}"),
            http,
            backoff,
            reporter: EventReporter::disabled(),
        })
    }

    pub fn from_config(config: &CollectorConfig) -> Result<Self, ClientError> {
        Self::new(
            &config.base_url(),
            &config.auth_scheme,
            &config.api_token,
            config.http_timeout,
            config.backoff.clone(),
        )
    }

    /// Publish rate-limit events through `reporter`
    pub fn with_reporter(mut self, reporter: EventReporter) -> Self {
        self.reporter = reporter;
        self
    }

    fn logs_url(&self, window: &FetchWindow, limit: u32, after: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(LOGS_PATH);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(since) = &window.since {
                query.append_pair("since", &format_timestamp(since));
            }
            query.append_pair("until", &format_timestamp(&window.until));
            if let Some(after) = after {
                query.append_pair(CURSOR_PARAM, after);
            }
        }
        url
    }

    fn headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&self.authorization).map_err(|_| {
            ClientError::InvalidHeader("credential is not a valid header value".to_string())
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }
}

#[async_trait]
impl LogApiClient for HttpLogClient {
    #[instrument(skip(self, window))]
    async fn get_logs_page(
        &self,
        window: &FetchWindow,
        limit: u32,
        after: Option<&str>,
    ) -> Result<LogPage, ClientError> {
        let url = self.logs_url(window, limit, after);
        let headers = self.headers()?;
        debug!(url = %url, "Calling URL");

        let mut backoff = RateLimitBackoff::new(&self.backoff);
        let response = execute_with_backoff(
            &mut backoff,
            || self.http.get(url.clone()).headers(headers.clone()).send(),
            &self.reporter,
        )
        .await?;

        if response.is_rate_limited() {
            return Err(ClientError::RateLimitExhausted {
                attempts: response.attempts,
            });
        }

        let records = records_from_body(&response.body)?;
        let next_cursor = next_cursor(&response.headers);

        debug!(
            record_count = records.len(),
            next_cursor = ?next_cursor,
            "Fetched log page"
        );

        Ok(LogPage {
            records,
            next_cursor,
        })
    }
}
