//! State-change polling
//!
//! Polls a refresh function until the observed state reaches one of the
//! target states, honoring pending states, a not-found budget, and a total
//! timeout. The poll interval starts at `min_timeout` and grows
//! geometrically to a cap, unless a fixed `poll_interval` is set.
//! Single-threaded and cooperative: the caller's thread blocks between
//! polls.

use crate::cancel::CancelToken;
use crate::error::WaitError;
use remote::RemoteError;
use std::time::{Duration, Instant};

/// Refresh callback: returns the object and its current state tag, or
/// `None` when the object does not exist (yet).
pub type RefreshFn<'a, T> = Box<dyn FnMut() -> Result<Option<(T, String)>, RemoteError> + 'a>;

const POLL_CAP: Duration = Duration::from_secs(10);

/// Configuration for one state-change wait.
pub struct StateChange<'a, T> {
    /// States that mean "keep polling".
    pub pending: Vec<String>,
    /// States that mean success.
    pub target: Vec<String>,
    pub refresh: RefreshFn<'a, T>,
    /// Total budget for the wait.
    pub timeout: Duration,
    /// Initial delay before the first poll.
    pub delay: Duration,
    /// Smallest (and first) poll interval.
    pub min_timeout: Duration,
    /// Fixed tick between polls; disables the geometric schedule when set.
    pub poll_interval: Option<Duration>,
    /// Consecutive `None` refreshes tolerated before giving up.
    pub not_found_checks: u32,
    /// Target must be observed this many times in a row.
    pub continuous_target_occurrence: u32,
}

impl<'a, T> StateChange<'a, T> {
    pub fn new(
        pending: &[&str],
        target: &[&str],
        refresh: impl FnMut() -> Result<Option<(T, String)>, RemoteError> + 'a,
    ) -> Self {
        Self {
            pending: pending.iter().map(|s| (*s).to_string()).collect(),
            target: target.iter().map(|s| (*s).to_string()).collect(),
            refresh: Box::new(refresh),
            timeout: Duration::from_secs(10 * 60),
            delay: Duration::ZERO,
            min_timeout: Duration::from_millis(500),
            poll_interval: None,
            not_found_checks: 20,
            continuous_target_occurrence: 1,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn continuous_target_occurrence(mut self, n: u32) -> Self {
        self.continuous_target_occurrence = n.max(1);
        self
    }

    /// Block until the target state is reached or the wait fails.
    pub fn wait(mut self, cancel: &CancelToken) -> crate::error::Result<T> {
        let start = Instant::now();

        if !self.delay.is_zero() && cancel.sleep(self.delay) {
            return Err(WaitError::Cancelled);
        }

        let mut interval = self
            .poll_interval
            .unwrap_or(self.min_timeout)
            .max(Duration::from_millis(1));
        let mut not_found: u32 = 0;
        let mut target_streak: u32 = 0;
        let mut last_state = String::new();

        loop {
            if cancel.is_cancelled() {
                return Err(WaitError::Cancelled);
            }

            match (self.refresh)() {
                Err(err) if err.is_retryable() => {
                    log::debug!("refresh failed transiently, still polling: {err}");
                }
                Err(err) => return Err(WaitError::Remote(err)),
                Ok(None) => {
                    not_found += 1;
                    target_streak = 0;
                    if not_found > self.not_found_checks {
                        return Err(WaitError::NotFound { checks: not_found });
                    }
                }
                Ok(Some((object, state))) => {
                    not_found = 0;
                    last_state.clone_from(&state);

                    if self.target.iter().any(|t| *t == state) {
                        target_streak += 1;
                        if target_streak >= self.continuous_target_occurrence {
                            return Ok(object);
                        }
                    } else if self.pending.iter().any(|p| *p == state) {
                        target_streak = 0;
                    } else {
                        return Err(WaitError::UnexpectedState {
                            state,
                            wanted: self.target.join(", "),
                        });
                    }
                }
            }

            let elapsed = start.elapsed();
            if elapsed + interval >= self.timeout {
                // Timeout reports the last observed state as the cause.
                return Err(WaitError::Timeout {
                    elapsed,
                    last: if last_state.is_empty() {
                        RemoteError::retryable("resource never reported a state")
                    } else {
                        RemoteError::invalid_state(last_state)
                    },
                });
            }

            if cancel.sleep(interval) {
                return Err(WaitError::Cancelled);
            }
            if self.poll_interval.is_none() {
                interval = (interval * 2).min(POLL_CAP);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast<'a, T>(conf: StateChange<'a, T>) -> StateChange<'a, T> {
        conf.timeout(Duration::from_secs(2))
            .min_timeout(Duration::from_millis(1))
    }

    #[test]
    fn test_pending_then_target() {
        let polls = Cell::new(0u32);
        let conf = StateChange::new(&["creating"], &["available"], || {
            let n = polls.get();
            polls.set(n + 1);
            if n < 3 {
                Ok(Some(("obj", "creating".to_string())))
            } else {
                Ok(Some(("obj", "available".to_string())))
            }
        });
        let token = CancelToken::new();
        let obj = fast(conf).wait(&token).unwrap();
        assert_eq!(obj, "obj");
        assert_eq!(polls.get(), 4);
    }

    #[test]
    fn test_unexpected_state() {
        let conf = StateChange::new(&["creating"], &["available"], || {
            Ok(Some(((), "failed".to_string())))
        });
        let token = CancelToken::new();
        let err = fast(conf).wait(&token).unwrap_err();
        assert!(matches!(err, WaitError::UnexpectedState { state, .. } if state == "failed"));
    }

    #[test]
    fn test_not_found_budget() {
        let conf = StateChange::<()>::new(&[], &["available"], || Ok(None)).not_found_checks(2);
        let token = CancelToken::new();
        let err = fast(conf).wait(&token).unwrap_err();
        assert!(matches!(err, WaitError::NotFound { checks: 3 }));
    }

    #[test]
    fn test_retryable_refresh_error_keeps_polling() {
        let polls = Cell::new(0u32);
        let conf = StateChange::new(&["creating"], &["available"], || {
            let n = polls.get();
            polls.set(n + 1);
            if n == 0 {
                Err(RemoteError::Throttling)
            } else {
                Ok(Some(((), "available".to_string())))
            }
        });
        let token = CancelToken::new();
        assert!(fast(conf).wait(&token).is_ok());
    }

    #[test]
    fn test_non_retryable_refresh_error_aborts() {
        let conf = StateChange::<()>::new(&[], &["available"], || {
            Err(RemoteError::terminal("access denied"))
        });
        let token = CancelToken::new();
        let err = fast(conf).wait(&token).unwrap_err();
        assert!(matches!(err, WaitError::Remote(RemoteError::Terminal { .. })));
    }

    #[test]
    fn test_timeout_reports_last_state() {
        let conf = StateChange::new(&["creating"], &["available"], || {
            Ok(Some(((), "creating".to_string())))
        })
        .timeout(Duration::from_millis(30))
        .min_timeout(Duration::from_millis(5));
        let token = CancelToken::new();
        let err = conf.wait(&token).unwrap_err();
        match err {
            WaitError::Timeout { last, .. } => {
                assert_eq!(last, RemoteError::invalid_state("creating"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_cancellation_is_prompt() {
        let token = CancelToken::new();
        let remote_token = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote_token.cancel();
        });

        let conf = StateChange::new(&["creating"], &["available"], || {
            Ok(Some(((), "creating".to_string())))
        })
        .timeout(Duration::from_secs(60))
        .min_timeout(Duration::from_millis(50));

        let start = Instant::now();
        let err = conf.wait(&token).unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, WaitError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_fixed_poll_interval_overrides_geometric_schedule() {
        let ticks = std::cell::RefCell::new(Vec::new());
        let conf = StateChange::new(&["creating"], &["available"], || {
            ticks.borrow_mut().push(Instant::now());
            let state = if ticks.borrow().len() < 4 {
                "creating"
            } else {
                "available"
            };
            Ok(Some(((), state.to_string())))
        })
        .timeout(Duration::from_secs(10))
        .poll_interval(Duration::from_millis(20));
        let token = CancelToken::new();
        conf.wait(&token).unwrap();

        // Every gap stays near the fixed tick; the default geometric
        // schedule would start at 500ms and double.
        let ticks = ticks.into_inner();
        assert_eq!(ticks.len(), 4);
        for pair in ticks.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(20), "gap {gap:?} too short");
            assert!(gap < Duration::from_millis(200), "gap {gap:?} grew");
        }
    }

    #[test]
    fn test_continuous_target_occurrence() {
        let polls = Cell::new(0u32);
        let conf = StateChange::new(&["rebalancing"], &["stable"], || {
            let n = polls.get();
            polls.set(n + 1);
            // Flaps back to pending once before settling.
            let state = match n {
                0 => "stable",
                1 => "rebalancing",
                _ => "stable",
            };
            Ok(Some(((), state.to_string())))
        })
        .continuous_target_occurrence(2);
        let token = CancelToken::new();
        fast(conf).wait(&token).unwrap();
        assert_eq!(polls.get(), 4);
    }
}
