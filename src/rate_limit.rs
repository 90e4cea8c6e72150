// SPDX-License-Identifier: Apache-2.0

//! Per-client fixed-window admission control.
//!
//! Each key owns a `(count, window_start)` pair. The window starts at the
//! first admitted request and resets once it has fully elapsed. The
//! check-and-increment happens under one lock, so two concurrent requests
//! can never both take the last slot.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::RateLimitSettings;

/// Expired windows are swept once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Whole seconds until the window resets, rounded up
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: RateLimitSettings) -> Self {
        Self::new(settings.window, settings.max_requests)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Admission check at an explicit instant. Rejected requests do not
    /// advance the counter.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut windows = self.windows.lock();

        if windows.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.saturating_duration_since(w.started) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window {
                count: 0,
                started: now,
            };
        }

        let retry_after_secs = ceil_secs(
            self.window
                .saturating_sub(now.saturating_duration_since(entry.started)),
        );

        if entry.count >= self.max_requests {
            return RateLimitDecision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                retry_after_secs,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - entry.count,
            retry_after_secs,
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = if duration.subsec_nanos() > 0 {
        duration.as_secs() + 1
    } else {
        duration.as_secs()
    };
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(15 * 60);

    #[test]
    fn test_twenty_first_request_is_rejected() {
        let limiter = RateLimiter::new(WINDOW, 20);
        let start = Instant::now();

        for i in 0..20 {
            let decision = limiter.check_at("1.2.3.4-curl", start + Duration::from_secs(i));
            assert!(decision.allowed, "request {} should be admitted", i + 1);
            assert_eq!(decision.remaining, 19 - i as u32);
        }

        let rejected = limiter.check_at("1.2.3.4-curl", start + Duration::from_secs(60));
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.retry_after_secs, 14 * 60);
    }

    #[test]
    fn test_window_expiry_resets_counter() {
        let limiter = RateLimiter::new(WINDOW, 2);
        let start = Instant::now();

        assert!(limiter.check_at("k", start).allowed);
        assert!(limiter.check_at("k", start).allowed);
        assert!(!limiter.check_at("k", start + WINDOW - Duration::from_millis(1)).allowed);

        let after = limiter.check_at("k", start + WINDOW);
        assert!(after.allowed);
        assert_eq!(after.remaining, 1);
    }

    #[test]
    fn test_rejections_do_not_extend_the_window() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 1);
        let start = Instant::now();

        assert!(limiter.check_at("k", start).allowed);
        for s in 1..10 {
            assert!(!limiter.check_at("k", start + Duration::from_secs(s)).allowed);
        }
        assert!(limiter.check_at("k", start + Duration::from_secs(10)).allowed);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(WINDOW, 1);
        let now = Instant::now();
        assert!(limiter.check_at("10.0.0.1-firefox", now).allowed);
        assert!(limiter.check_at("10.0.0.1-curl", now).allowed);
        assert!(!limiter.check_at("10.0.0.1-firefox", now).allowed);
    }

    #[test]
    fn test_expired_windows_are_pruned() {
        let limiter = RateLimiter::new(WINDOW, 1);
        let start = Instant::now();
        for i in 0..PRUNE_THRESHOLD {
            limiter.check_at(&format!("client-{i}"), start);
        }
        assert_eq!(limiter.windows.lock().len(), PRUNE_THRESHOLD);

        // Still inside the window: nothing can be dropped.
        limiter.check_at("late", start + Duration::from_secs(1));
        assert_eq!(limiter.windows.lock().len(), PRUNE_THRESHOLD + 1);

        limiter.check_at("fresh", start + WINDOW);
        let windows = limiter.windows.lock();
        assert_eq!(windows.len(), 2);
        assert!(windows.contains_key("late"));
        assert!(windows.contains_key("fresh"));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let limiter = RateLimiter::new(Duration::from_millis(1500), 1);
        let start = Instant::now();
        limiter.check_at("k", start);
        let decision = limiter.check_at("k", start + Duration::from_millis(100));
        assert_eq!(decision.retry_after_secs, 2);
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::new(WINDOW, 50));
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| limiter.check_at("shared", now).allowed)
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
