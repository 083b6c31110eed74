//! Per-host token-bucket rate limiter (C2).
//!
//! A per-key bucket living in a `DashMap`, specialized to hostnames and a
//! sliding window.

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct BucketStatus {
    pub tokens: u32,
    pub request_count: u32,
    pub window_start: Instant,
}

struct Bucket {
    window_start: Instant,
    request_count: u32,
}

/// Sliding-window token bucket keyed by hostname (§4.5 C2, §5).
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { buckets: DashMap::new() }
    }

    /// Returns `true` and records the call if `host` has not exhausted its
    /// window budget; `false` otherwise. A new window starts once `window_ms`
    /// has elapsed since `window_start`.
    pub fn can_make_request(&self, host: &str, max_requests: u32, window_ms: u64) -> bool {
        let now = Instant::now();
        let window = Duration::from_millis(window_ms);
        let mut entry = self.buckets.entry(host.to_string()).or_insert_with(|| Bucket {
            window_start: now,
            request_count: 0,
        });

        if now.duration_since(entry.window_start) >= window {
            entry.window_start = now;
            entry.request_count = 0;
        }

        if entry.request_count < max_requests {
            entry.request_count += 1;
            true
        } else {
            false
        }
    }

    pub fn reset(&self, host: &str) {
        self.buckets.remove(host);
    }

    pub fn status(&self, host: &str) -> Option<BucketStatus> {
        self.buckets.get(host).map(|b| BucketStatus {
            tokens: 0,
            request_count: b.request_count,
            window_start: b.window_start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn capacity_plus_one_is_denied() {
        let rl = RateLimiter::new();
        for _ in 0..3 {
            assert!(rl.can_make_request("api.example.com", 3, 60_000));
        }
        assert!(!rl.can_make_request("api.example.com", 3, 60_000));
    }

    #[test]
    fn distinct_hosts_are_independent() {
        let rl = RateLimiter::new();
        assert!(rl.can_make_request("a.example.com", 1, 60_000));
        assert!(rl.can_make_request("b.example.com", 1, 60_000));
        assert!(!rl.can_make_request("a.example.com", 1, 60_000));
    }

    #[test]
    fn window_resets_after_elapsed_time() {
        let rl = RateLimiter::new();
        assert!(rl.can_make_request("api.example.com", 1, 20));
        assert!(!rl.can_make_request("api.example.com", 1, 20));
        sleep(Duration::from_millis(30));
        assert!(rl.can_make_request("api.example.com", 1, 20));
    }

    #[test]
    fn reset_clears_bucket() {
        let rl = RateLimiter::new();
        assert!(rl.can_make_request("api.example.com", 1, 60_000));
        assert!(!rl.can_make_request("api.example.com", 1, 60_000));
        rl.reset("api.example.com");
        assert!(rl.can_make_request("api.example.com", 1, 60_000));
    }
}
