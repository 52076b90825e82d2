use std::time::Duration;
use tracing::trace;

/// Trait defining backoff behavior
pub trait Backoff: Send + Sync {
    /// Delay to wait before the next attempt, or `None` once the backoff is
    /// exhausted and the caller should stop retrying
    fn next_delay(&mut self) -> Option<Duration>;

    /// Reset any internal state
    fn reset(&mut self);
}

/// Settings for rate-limit backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// First wait after a rate-limit response
    pub initial_delay: Duration,
    /// Largest wait that will still be slept
    pub max_delay: Duration,
    /// Growth factor applied after every wait
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(32000),
            multiplier: 2,
        }
    }
}

/// Deterministic exponential backoff for rate-limited requests
///
/// The delay starts at `initial_delay` and is multiplied after each wait.
/// Once the current delay is larger than `max_delay` the backoff is exhausted:
/// the cap limits how many times a request is retried rather than clamping
/// the wait.
#[derive(Debug, Clone)]
pub struct RateLimitBackoff {
    initial_delay: Duration,
    current_delay: Duration,
    max_delay: Duration,
    multiplier: u32,
}

impl RateLimitBackoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            initial_delay: config.initial_delay,
            current_delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// A zero delay never grows towards the cap, so it counts as exhausted
    pub fn is_exhausted(&self) -> bool {
        self.current_delay.is_zero() || self.current_delay > self.max_delay
    }
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self::new(&BackoffConfig::default())
    }
}

impl Backoff for RateLimitBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            trace!(
                current_delay_ms = self.current_delay.as_millis() as u64,
                max_delay_ms = self.max_delay.as_millis() as u64,
                "Backoff exhausted"
            );
            return None;
        }

        let delay = self.current_delay;
        self.current_delay = delay.saturating_mul(self.multiplier);

        trace!(
            delay_ms = delay.as_millis() as u64,
            next_delay_ms = self.current_delay.as_millis() as u64,
            "Calculated backoff delay"
        );

        Some(delay)
    }

    fn reset(&mut self) {
        self.current_delay = self.initial_delay;
    }
}
