//! Rate-limit aware request execution
//!
//! A request moves through `Attempting -> {Success, RateLimited, Failed}`:
//!
//! - `200 OK` reads the body and returns.
//! - The rate-limit status sleeps for the current backoff delay and tries
//!   again. Once the backoff is exhausted the rate-limited response itself is
//!   read and returned instead of looping.
//! - Any other status is fatal and is not retried.
//! - Transport errors are returned immediately.

mod backoff;

pub use backoff::{Backoff, BackoffConfig, RateLimitBackoff};

use crate::error::ClientError;
use crate::monitoring::{EventReporter, PollEvent};
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::future::Future;
use tracing::{debug, trace, warn};

/// Status code the API uses to signal rate limiting
pub const RATE_LIMIT_STATUS: StatusCode = StatusCode::TOO_MANY_REQUESTS;

/// A fully read HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Number of requests sent to obtain this response
    pub attempts: u32,
}

impl HttpResponse {
    /// True when the backoff ran out while the API was still rate limiting
    pub fn is_rate_limited(&self) -> bool {
        self.status == RATE_LIMIT_STATUS
    }
}

/// Send a request until it succeeds, fails fatally, or the backoff is exhausted.
///
/// `send` is invoked once per attempt and must build a fresh request each time.
/// The backoff is reset before the first attempt.
pub async fn execute_with_backoff<B, F, Fut>(
    backoff: &mut B,
    mut send: F,
    reporter: &EventReporter,
) -> Result<HttpResponse, ClientError>
where
    B: Backoff,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    backoff.reset();
    let mut attempts = 0;

    loop {
        attempts += 1;
        trace!(attempt = attempts, "Executing request");

        let response = send().await?;
        let status = response.status();

        if status != StatusCode::OK && status != RATE_LIMIT_STATUS {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, attempt = attempts, "Request failed with unexpected status");
            return Err(ClientError::UnexpectedStatus { status, body });
        }

        if status == RATE_LIMIT_STATUS {
            if let Some(delay) = backoff.next_delay() {
                warn!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, retrying after delay"
                );
                reporter.send(PollEvent::rate_limited(attempts, delay));
                tokio::time::sleep(delay).await;
                continue;
            }
            warn!(attempts = attempts, "Rate limited and backoff exhausted, giving up");
        } else {
            debug!(attempts = attempts, "Request succeeded");
        }

        let headers = response.headers().clone();
        let body = response.bytes().await?;
        return Ok(HttpResponse {
            status,
            headers,
            body,
            attempts,
        });
    }
}
