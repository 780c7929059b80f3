//! Per-provider circuit breaker.
//!
//! Two states only — closed and open. Half-open probing is a Selector-level
//! decision (see `crate::proxy::selector`), not a state this breaker tracks
//! internally.

mod registry;

pub use registry::BreakerRegistry;

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A point-in-time view of a breaker, used for the `/_health` endpoint and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerSnapshot {
    pub is_open: bool,
    pub consecutive_failures: u32,
    pub remaining_time_until_auto_reset: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Per-provider failure tracker.
///
/// Every method takes the internal lock, mutates, and releases it — none perform
/// I/O or hold the lock across an `.await`.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(Inner {
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Records a successful attempt: clears the failure counter and closes the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Records a failed attempt. Trips the breaker the moment the counter reaches
    /// `failure_threshold`; counting continues past that without re-tripping.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold && inner.opened_at.is_none() {
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Whether the breaker currently reports open. Auto-resets (clearing both the
    /// counter and the open timestamp) as a side effect once `reset_timeout` has
    /// elapsed, so the next inspection sees a closed breaker.
    pub fn is_open(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.opened_at {
            Some(opened_at) if now.saturating_duration_since(opened_at) < self.reset_timeout => true,
            Some(_) => {
                inner.opened_at = None;
                inner.consecutive_failures = 0;
                false
            }
            None => false,
        }
    }

    /// Point-in-time view for health reporting and tests.
    pub fn snapshot(&self, now: Instant) -> BreakerSnapshot {
        let inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        let remaining_time_until_auto_reset = inner.opened_at.and_then(|opened_at| {
            let elapsed = now.saturating_duration_since(opened_at);
            self.reset_timeout.checked_sub(elapsed)
        });
        BreakerSnapshot {
            is_open: remaining_time_until_auto_reset.is_some(),
            consecutive_failures: inner.consecutive_failures,
            remaining_time_until_auto_reset,
        }
    }

    /// Hard reset to the initial closed state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_millis(50))
    }

    #[test]
    fn starts_closed() {
        let b = breaker();
        assert!(!b.is_open(Instant::now()));
    }

    #[test]
    fn trips_at_threshold() {
        let b = breaker();
        b.record_failure();
        b.record_failure();
        assert!(!b.is_open(Instant::now()));
        b.record_failure();
        assert!(b.is_open(Instant::now()));
    }

    #[test]
    fn counting_continues_past_threshold_without_retripping() {
        let b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        let snap = b.snapshot(Instant::now());
        assert_eq!(snap.consecutive_failures, 5);
        assert!(snap.is_open);
    }

    #[test]
    fn success_closes_and_resets_counter() {
        let b = breaker();
        b.record_failure();
        b.record_failure();
        b.record_failure();
        assert!(b.is_open(Instant::now()));
        b.record_success();
        assert!(!b.is_open(Instant::now()));
        assert_eq!(b.snapshot(Instant::now()).consecutive_failures, 0);
    }

    #[test]
    fn auto_resets_after_reset_timeout_elapses() {
        let b = CircuitBreaker::new(1, Duration::from_millis(10));
        b.record_failure();
        assert!(b.is_open(Instant::now()));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!b.is_open(Instant::now()));
        assert_eq!(b.snapshot(Instant::now()).consecutive_failures, 0);
    }

    #[test]
    fn explicit_reset_clears_open_state() {
        let b = breaker();
        b.record_failure();
        b.record_failure();
        b.record_failure();
        assert!(b.is_open(Instant::now()));
        b.reset();
        assert!(!b.is_open(Instant::now()));
        assert_eq!(b.snapshot(Instant::now()).consecutive_failures, 0);
    }

    #[test]
    fn reset_all_is_idempotent_on_a_single_breaker() {
        let b = breaker();
        b.record_failure();
        b.reset();
        b.reset();
        assert_eq!(b.snapshot(Instant::now()).consecutive_failures, 0);
    }
}
