//! Request gate for Strava's rate limits.
//!
//! Strava meters requests per 15-minute window and per day. A 403 means the
//! application is blocked outright, and a run of 429 or 5xx replies means the
//! current window is spent. In both cases further calls only burn quota, so
//! the gate refuses them until one cooldown has passed and then starts again
//! with a clean failure count.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Why requests are being refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenReason {
    /// Strava answered 403.
    Forbidden,
    /// This many failed requests in a row.
    Failures(u32),
}

/// Snapshot of the breaker, for logs and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    Closed { failures: u32 },
    Open { reason: OpenReason, remaining: Duration },
}

// The failure count only exists while closed; opening discards it.
#[derive(Debug, Clone, Copy)]
enum State {
    Closed { failures: u32 },
    Open { since: Instant, reason: OpenReason },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<State>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            state: Mutex::new(State::Closed { failures: 0 }),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// One Strava rate window of cooldown; opens on the third failure in a row.
    pub fn for_strava() -> Self {
        Self::new(Duration::from_secs(15 * 60), 3)
    }

    /// Lock and close the gate first if the cooldown has run out.
    fn current(&self) -> MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let State::Open { since, reason } = *state {
            if since.elapsed() >= self.cooldown {
                tracing::info!(?reason, "Strava cooldown over, allowing requests again");
                *state = State::Closed { failures: 0 };
            }
        }
        state
    }

    fn open(&self, state: &mut State, reason: OpenReason) {
        tracing::warn!(
            ?reason,
            cooldown_secs = self.cooldown.as_secs(),
            "refusing Strava requests until cooldown ends"
        );
        *state = State::Open {
            since: Instant::now(),
            reason,
        };
    }

    pub fn is_allowed(&self) -> bool {
        matches!(*self.current(), State::Closed { .. })
    }

    pub fn status(&self) -> BreakerStatus {
        match *self.current() {
            State::Closed { failures } => BreakerStatus::Closed { failures },
            State::Open { since, reason } => BreakerStatus::Open {
                reason,
                remaining: self.cooldown.saturating_sub(since.elapsed()),
            },
        }
    }

    pub fn record_success(&self) {
        let mut state = self.current();
        if let State::Closed { failures } = &mut *state {
            *failures = 0;
        }
    }

    /// 429 or 5xx. Ignored while already open, so late replies do not
    /// extend the cooldown.
    pub fn record_failure(&self) {
        let mut state = self.current();
        if let State::Closed { failures } = *state {
            let failures = failures + 1;
            if failures >= self.failure_threshold {
                self.open(&mut state, OpenReason::Failures(failures));
            } else {
                *state = State::Closed { failures };
            }
        }
    }

    /// 403: open now, whatever the failure count.
    pub fn forbid(&self) {
        let mut state = self.current();
        self.open(&mut state, OpenReason::Forbidden);
    }
}
