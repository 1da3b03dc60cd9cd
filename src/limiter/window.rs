//! Sliding-Window Rate Limiter
//!
//! Per-IP admission control over a 60-second window. Each client IP owns a
//! deque of request timestamps; a request is allowed when, after pruning
//! entries older than the window, fewer than `max_requests` remain. The
//! address alone is the key, so every connection from one host (or one NAT)
//! shares a budget, and IPv4 and IPv6 addresses are distinct keys.
//!
//! Timestamps come from the monotonic clock, so wall-clock jumps cannot
//! open or close the window. A coarse mutex over the bucket map is enough
//! at the intended scale; the critical section is a deque prune and a push.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// The sliding window length.
const WINDOW: Duration = Duration::from_secs(60);

/// How often the full bucket map is swept for empty buckets.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct LimiterState {
    /// Per-IP request timestamps, insertion order = time order.
    buckets: HashMap<IpAddr, VecDeque<Instant>>,
    /// Last full sweep of empty buckets.
    last_cleanup: Instant,
}

/// Thread-safe per-IP sliding-window rate limiter.
///
/// # Example
///
/// ```
/// use linesift::limiter::RateLimiter;
/// use std::net::{IpAddr, Ipv4Addr};
///
/// let limiter = RateLimiter::new(2);
/// let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
/// assert!(limiter.check(ip));
/// assert!(limiter.check(ip));
/// assert!(!limiter.check(ip));
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    /// False for the no-op limiter.
    enabled: bool,
    /// Maximum accepted requests per window per IP.
    max_requests: usize,
    /// Window length; the protocol constant, except in tests.
    window: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_minute` per client IP.
    pub fn new(requests_per_minute: usize) -> Self {
        Self::with_window(requests_per_minute, WINDOW)
    }

    /// Creates a limiter with an explicit window length.
    pub fn with_window(max_requests: usize, window: Duration) -> Self {
        Self {
            enabled: true,
            max_requests,
            window,
            state: Mutex::new(LimiterState {
                buckets: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    /// Creates the no-op limiter used when rate limiting is configured off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_requests: 0,
            window: WINDOW,
            state: Mutex::new(LimiterState {
                buckets: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    /// True unless this is the no-op limiter.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records a request from `ip` and reports whether it is allowed.
    ///
    /// Rejected requests are not recorded; only accepted ones consume
    /// budget. A poisoned lock fails open: the request is allowed
    /// unmetered.
    pub fn check(&self, ip: IpAddr) -> bool {
        if !self.enabled {
            return true;
        }

        let now = Instant::now();
        let Ok(mut state) = self.state.lock() else {
            return true;
        };

        if now.duration_since(state.last_cleanup) >= CLEANUP_INTERVAL {
            Self::sweep(&mut state, now, self.window);
        }

        let bucket = state.buckets.entry(ip).or_default();
        while bucket
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            bucket.pop_front();
        }

        if bucket.len() >= self.max_requests {
            return false;
        }

        bucket.push_back(now);
        true
    }

    /// Number of IPs currently holding a bucket.
    pub fn tracked_ips(&self) -> usize {
        self.state.lock().map_or(0, |state| state.buckets.len())
    }

    /// Drops buckets whose every timestamp has aged out of the window.
    fn sweep(state: &mut LimiterState, now: Instant, window: Duration) {
        let before = state.buckets.len();
        state
            .buckets
            .retain(|_, bucket| bucket.back().is_some_and(|t| now.duration_since(*t) < window));
        state.last_cleanup = now;
        debug!(
            dropped = before - state.buckets.len(),
            remaining = state.buckets.len(),
            "rate limiter bucket sweep"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn ipv4(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(3);
        let ip = ipv4(1);

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[test]
    fn budgets_are_per_ip() {
        let limiter = RateLimiter::new(1);

        assert!(limiter.check(ipv4(1)));
        assert!(!limiter.check(ipv4(1)));

        // A different address has its own bucket.
        assert!(limiter.check(ipv4(2)));
        assert_eq!(limiter.tracked_ips(), 2);
    }

    #[test]
    fn ipv6_addresses_are_distinct_keys() {
        let limiter = RateLimiter::new(1);
        let v4 = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);

        assert!(limiter.check(v4));
        assert!(limiter.check(v6));
        assert!(!limiter.check(v4));
        assert!(!limiter.check(v6));
    }

    #[test]
    fn window_expiry_restores_budget() {
        let limiter = RateLimiter::with_window(1, Duration::from_millis(30));
        let ip = ipv4(1);

        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.check(ip));
    }

    #[test]
    fn rejected_requests_consume_no_budget() {
        let limiter = RateLimiter::with_window(2, Duration::from_millis(50));
        let ip = ipv4(1);

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        // Hammering while limited must not extend the lockout.
        for _ in 0..10 {
            assert!(!limiter.check(ip));
        }

        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.check(ip));
    }

    #[test]
    fn disabled_limiter_allows_everything() {
        let limiter = RateLimiter::disabled();
        assert!(!limiter.is_enabled());
        for _ in 0..10_000 {
            assert!(limiter.check(ipv4(1)));
        }
        assert_eq!(limiter.tracked_ips(), 0);
    }

    #[test]
    fn sweep_drops_aged_out_buckets() {
        let limiter = RateLimiter::with_window(1, Duration::from_millis(10));
        limiter.check(ipv4(1));
        limiter.check(ipv4(2));
        assert_eq!(limiter.tracked_ips(), 2);

        std::thread::sleep(Duration::from_millis(20));
        {
            let mut state = limiter.state.lock().unwrap();
            RateLimiter::sweep(&mut state, Instant::now(), limiter.window);
        }
        assert_eq!(limiter.tracked_ips(), 0);
    }
}
