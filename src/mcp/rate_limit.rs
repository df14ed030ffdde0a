//! Fixed-window request counters, one per service.
//!
//! A window starts on the first call a service sees (or the first call after
//! the previous window expired) and lasts `window_ms`. Expiry is always
//! checked before the count is read or incremented.

use std::collections::HashMap;

use serde::Serialize;

use super::config::RateLimitPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowCounter {
    count: u32,
    /// Epoch millis after which the window is over.
    reset_at: i64,
}

/// Point-in-time view of a service's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    pub count: u32,
    pub reset_time: i64,
    pub limit: u32,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    counters: HashMap<String, WindowCounter>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one attempt against `service`. Returns `false` when the ceiling
    /// for the current window is already reached; rejected attempts are not
    /// counted.
    pub fn check_and_increment(&mut self, service: &str, policy: &RateLimitPolicy, now: i64) -> bool {
        let window = policy.window_ms as i64;
        let mut counter = self
            .counters
            .get(service)
            .copied()
            .unwrap_or(WindowCounter {
                count: 0,
                reset_at: now + window,
            });

        if now > counter.reset_at {
            counter.count = 0;
            counter.reset_at = now + window;
        }

        if counter.count >= policy.requests {
            return false;
        }

        counter.count += 1;
        self.counters.insert(service.to_string(), counter);
        true
    }

    pub fn snapshot(&self, service: &str, policy: &RateLimitPolicy) -> Option<RateLimitSnapshot> {
        self.counters.get(service).map(|c| RateLimitSnapshot {
            count: c.count,
            reset_time: c.reset_at,
            limit: policy.requests,
        })
    }

    pub fn remove(&mut self, service: &str) {
        self.counters.remove(service);
    }

    /// Drop counters whose window ended more than `grace_ms` ago. Returns how
    /// many were removed.
    pub fn prune_idle(&mut self, now: i64, grace_ms: i64) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, c| now <= c.reset_at + grace_ms);
        before - self.counters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(requests: u32, window_ms: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            requests,
            window_ms,
        }
    }

    #[test]
    fn allows_exactly_ceiling_within_window() {
        let mut limiter = RateLimiter::new();
        let p = policy(3, 1_000);
        assert!(limiter.check_and_increment("swap", &p, 0));
        assert!(limiter.check_and_increment("swap", &p, 10));
        assert!(limiter.check_and_increment("swap", &p, 20));
        assert!(!limiter.check_and_increment("swap", &p, 30));
        assert!(!limiter.check_and_increment("swap", &p, 1_000));

        let snap = limiter.snapshot("swap", &p).unwrap();
        assert_eq!(snap.count, 3);
        assert_eq!(snap.reset_time, 1_000);
        assert_eq!(snap.limit, 3);
    }

    #[test]
    fn window_resets_after_expiry() {
        let mut limiter = RateLimiter::new();
        let p = policy(1, 1_000);
        assert!(limiter.check_and_increment("swap", &p, 0));
        assert!(!limiter.check_and_increment("swap", &p, 500));
        assert!(limiter.check_and_increment("swap", &p, 1_001));

        let snap = limiter.snapshot("swap", &p).unwrap();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.reset_time, 2_001);
    }

    #[test]
    fn window_is_anchored_to_first_use() {
        let mut limiter = RateLimiter::new();
        let p = policy(5, 1_000);
        assert!(limiter.snapshot("defi", &p).is_none());
        limiter.check_and_increment("defi", &p, 42_000);
        assert_eq!(limiter.snapshot("defi", &p).unwrap().reset_time, 43_000);
    }

    #[test]
    fn services_are_counted_independently() {
        let mut limiter = RateLimiter::new();
        let p = policy(1, 1_000);
        assert!(limiter.check_and_increment("swap", &p, 0));
        assert!(limiter.check_and_increment("nft", &p, 0));
        assert!(!limiter.check_and_increment("swap", &p, 1));
    }

    #[test]
    fn prune_drops_only_long_expired_counters() {
        let mut limiter = RateLimiter::new();
        let p = policy(1, 1_000);
        limiter.check_and_increment("old", &p, 0);
        limiter.check_and_increment("fresh", &p, 9_500);
        assert_eq!(limiter.prune_idle(10_000, 5_000), 1);
        assert!(limiter.snapshot("old", &p).is_none());
        assert!(limiter.snapshot("fresh", &p).is_some());
    }
}
