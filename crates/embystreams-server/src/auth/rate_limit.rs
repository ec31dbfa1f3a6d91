//! Per-caller minimum-interval rate limiter.
//!
//! Each caller key remembers when its last request was admitted. A request
//! arriving sooner than `min_interval` after that is rejected and does not
//! move the timestamp. The gateway holds the limiter behind a mutex so the
//! check and the update happen in one critical section.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use embystreams_core::RateLimitError;
use tracing::debug;

/// Fixed policy: one admitted request per caller per second.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Ledger size at which stale entries are swept.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between admitted requests of one caller.
    min_interval: Duration,
    /// Per-caller last admitted request.
    last_seen: HashMap<String, Instant>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MIN_INTERVAL)
    }
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_seen: HashMap::new(),
        }
    }

    /// Admit the request and record `now`, or reject it.
    pub fn check_and_update(&mut self, caller_key: &str, now: Instant) -> Result<(), RateLimitError> {
        if let Some(last) = self.last_seen.get(caller_key) {
            if now.saturating_duration_since(*last) < self.min_interval {
                return Err(RateLimitError::TooManyRequests);
            }
        }

        if self.last_seen.len() >= SWEEP_THRESHOLD {
            self.sweep(now);
            debug!(tracked = self.tracked_callers(), "rate-limit ledger swept");
        }

        self.last_seen.insert(caller_key.to_string(), now);
        Ok(())
    }

    /// Drop entries old enough that they can no longer reject anything.
    pub fn sweep(&mut self, now: Instant) {
        let min_interval = self.min_interval;
        self.last_seen
            .retain(|_, last| now.saturating_duration_since(*last) < min_interval);
    }

    pub fn tracked_callers(&self) -> usize {
        self.last_seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[test]
    fn second_call_within_interval_is_rejected() {
        let mut rl = RateLimiter::default();
        let t0 = Instant::now();
        assert!(rl.check_and_update("caller", t0).is_ok());
        assert_eq!(
            rl.check_and_update("caller", t0 + Duration::from_millis(999)),
            Err(RateLimitError::TooManyRequests)
        );
    }

    #[test]
    fn calls_a_second_apart_pass() {
        let mut rl = RateLimiter::default();
        let t0 = Instant::now();
        assert!(rl.check_and_update("caller", t0).is_ok());
        assert!(rl.check_and_update("caller", t0 + Duration::from_secs(1)).is_ok());
        assert!(rl.check_and_update("caller", t0 + Duration::from_secs(3)).is_ok());
    }

    #[test]
    fn rejection_does_not_extend_the_window() {
        let mut rl = RateLimiter::default();
        let t0 = Instant::now();
        rl.check_and_update("caller", t0).unwrap();
        assert!(rl
            .check_and_update("caller", t0 + Duration::from_millis(900))
            .is_err());
        // Measured from t0, not from the rejected call.
        assert!(rl
            .check_and_update("caller", t0 + Duration::from_millis(1000))
            .is_ok());
    }

    #[test]
    fn callers_are_independent() {
        let mut rl = RateLimiter::default();
        let t0 = Instant::now();
        assert!(rl.check_and_update("a", t0).is_ok());
        assert!(rl.check_and_update("b", t0).is_ok());
        assert!(rl.check_and_update("a", t0).is_err());
    }

    #[test]
    fn sweep_keeps_recent_entries() {
        let mut rl = RateLimiter::default();
        let t0 = Instant::now();
        rl.check_and_update("old", t0).unwrap();
        rl.check_and_update("new", t0 + Duration::from_millis(1500)).unwrap();
        rl.sweep(t0 + Duration::from_millis(1600));
        assert_eq!(rl.tracked_callers(), 1);
        assert!(rl
            .check_and_update("new", t0 + Duration::from_millis(1700))
            .is_err());
    }

    #[tokio::test]
    async fn concurrent_callers_admit_exactly_one() {
        let rl = Arc::new(Mutex::new(RateLimiter::default()));
        let now = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let rl = rl.clone();
            handles.push(tokio::spawn(async move {
                rl.lock().await.check_and_update("same", now).is_ok()
            }));
        }
        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
