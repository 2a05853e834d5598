//! Bounded retry with exponential backoff
//!
//! Retries an attempt until it succeeds, returns a non-retryable error, or
//! the time budget elapses. Widely used to absorb eventual consistency and
//! throttling from remote services.

use crate::cancel::CancelToken;
use crate::error::WaitError;
use remote::RemoteError;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Outcome classification of one attempt.
#[derive(Debug)]
pub enum Recoverable {
    /// Transient; try again within the budget.
    Retry(RemoteError),
    /// Permanent; stop immediately.
    Halt(RemoteError),
}

impl Recoverable {
    /// Classify by the error's own retryability.
    pub fn classify(err: RemoteError) -> Self {
        if err.is_retryable() {
            Self::Retry(err)
        } else {
            Self::Halt(err)
        }
    }
}

impl From<RemoteError> for Recoverable {
    fn from(err: RemoteError) -> Self {
        Self::classify(err)
    }
}

/// Exponential backoff schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay before the second attempt
    pub initial: Duration,
    /// Multiplier applied per attempt
    pub factor: f64,
    /// Delay ceiling
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            factor: 2.0,
            cap: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// Delay for a given attempt number (0-indexed), jittered +/-20%.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial.as_secs_f64() * self.factor.powi(attempt as i32);
        let capped = base.min(self.cap.as_secs_f64());
        Duration::from_secs_f64(capped * jitter_factor())
    }
}

// Cheap jitter without a PRNG dependency; the clock's subsecond noise is
// plenty for spreading poll storms.
fn jitter_factor() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    0.8 + 0.4 * f64::from(nanos % 1000) / 1000.0
}

/// Retry `attempt` until success, a halt, cancellation, or `timeout`.
///
/// On timeout the last retryable error is returned inside
/// [`WaitError::Timeout`], so callers can inspect the underlying cause
/// without a final direct call.
pub fn retry<T, F>(timeout: Duration, cancel: &CancelToken, mut attempt: F) -> crate::error::Result<T>
where
    F: FnMut() -> Result<T, Recoverable>,
{
    retry_with(timeout, &Backoff::default(), cancel, &mut attempt)
}

/// [`retry`] with an explicit backoff schedule.
pub fn retry_with<T, F>(
    timeout: Duration,
    backoff: &Backoff,
    cancel: &CancelToken,
    attempt: &mut F,
) -> crate::error::Result<T>
where
    F: FnMut() -> Result<T, Recoverable>,
{
    let start = Instant::now();
    let mut tries: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }

        match attempt() {
            Ok(value) => return Ok(value),
            Err(Recoverable::Halt(err)) => return Err(WaitError::Remote(err)),
            Err(Recoverable::Retry(err)) => {
                let delay = backoff.delay_for_attempt(tries);
                tries += 1;

                let elapsed = start.elapsed();
                if elapsed + delay >= timeout {
                    log::debug!("retry budget exhausted after {tries} attempts: {err}");
                    return Err(WaitError::Timeout { elapsed, last: err });
                }

                log::debug!("attempt {tries} failed ({err}), retrying in {delay:?}");
                if cancel.sleep(delay) {
                    return Err(WaitError::Cancelled);
                }
            }
        }
    }
}
