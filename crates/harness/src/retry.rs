//! Bounded fixed-interval retry, the only polling loop in the harness

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Bounded retry executor
///
/// `execute` runs an operation until it succeeds, fails with a
/// non-retryable error, or keeps failing retryably past `max_elapsed`.
/// A single invocation never runs longer than `max_elapsed + interval`:
/// attempts still in flight at that deadline are cancelled.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_elapsed: Duration,
    interval: Duration,
    is_retryable: fn(&Error) -> bool,
}

impl RetryPolicy {
    pub fn new(max_elapsed: Duration, interval: Duration) -> Self {
        Self {
            max_elapsed,
            interval,
            is_retryable: Error::is_retryable,
        }
    }

    pub fn from_pair((max_elapsed, interval): (Duration, Duration)) -> Self {
        Self::new(max_elapsed, interval)
    }

    /// Replace the retry predicate
    pub fn retry_on(mut self, is_retryable: fn(&Error) -> bool) -> Self {
        self.is_retryable = is_retryable;
        self
    }

    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `op` until success, a fatal error, or timeout.
    ///
    /// `what` names the wait in logs and in the `Timeout` error.
    pub async fn execute<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let deadline = start + self.max_elapsed + self.interval;
        let mut attempts = 0u32;
        let mut last: Option<Error> = None;

        loop {
            attempts += 1;
            let err = match timeout_at(deadline, op()).await {
                Ok(Ok(value)) => {
                    if attempts > 1 {
                        info!("{} ready after {} attempt(s)", what, attempts);
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => {
                    debug!("{} attempt {} cancelled at the deadline", what, attempts);
                    let last = last.unwrap_or_else(|| Error::not_ready("attempt did not complete in time"));
                    return Err(self.timed_out(what, start, last));
                }
            };

            if !(self.is_retryable)(&err) {
                return Err(err);
            }

            if start.elapsed() >= self.max_elapsed {
                return Err(self.timed_out(what, start, err));
            }

            if attempts == 1 {
                info!("Waiting for {} ({})", what, err);
            } else {
                debug!("{} attempt {}: {}", what, attempts, err);
            }
            last = Some(err);
            sleep_until((Instant::now() + self.interval).min(deadline)).await;
        }
    }

    fn timed_out(&self, what: &str, start: Instant, last: Error) -> Error {
        Error::Timeout {
            wait: what.to_string(),
            elapsed: start.elapsed(),
            last: Box::new(last),
        }
    }
}
