//! Fixed-window login throttling.
//!
//! Tracks attempt counts per client address and rejects callers that
//! exceed the quota inside one window. This is the only component in the
//! relay that keeps synchronized counters across concurrent requests;
//! everything else reads registry snapshots.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::constants::{LOGIN_ATTEMPT_WINDOW, LOGIN_MAX_ATTEMPTS};

/// Per-address attempt counter for one window.
#[derive(Debug)]
struct Window {
    /// Attempts recorded since `started_at`.
    count: u32,
    /// When the current window opened.
    started_at: Instant,
}

/// Fixed-window rate limiter keyed by client IP.
///
/// Counting is strict fixed-window: when a window expires the counter
/// resets to zero, so a burst straddling the boundary can briefly see up
/// to twice the quota. That matches the coarse protection this path needs.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    /// Synchronized per-address windows.
    windows: Mutex<HashMap<IpAddr, Window>>,
    /// Attempts allowed per window.
    max_attempts: u32,
    /// Window length.
    window: Duration,
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new(LOGIN_MAX_ATTEMPTS, LOGIN_ATTEMPT_WINDOW)
    }
}

impl FixedWindowLimiter {
    /// Creates a limiter with an explicit quota, mainly for tests.
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_attempts,
            window,
        }
    }

    /// Records one attempt for `addr` and reports whether it is allowed.
    ///
    /// Returns `false` once the caller has used up its quota for the
    /// current window. Callers must check this before doing any credential
    /// lookup or comparison.
    pub fn check(&self, addr: IpAddr) -> bool {
        self.check_at(addr, Instant::now())
    }

    /// Clock-injectable variant of [`check`](Self::check).
    fn check_at(&self, addr: IpAddr, now: Instant) -> bool {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            // A poisoned lock means a panic mid-update; failing open here
            // would silently drop throttling, so fail closed.
            Err(_) => {
                log::error!("rate limiter lock poisoned, rejecting attempt");
                return false;
            }
        };
        let window = windows.entry(addr).or_insert(Window {
            count: 0,
            started_at: now,
        });
        if now.duration_since(window.started_at) >= self.window {
            window.count = 0;
            window.started_at = now;
        }
        window.count += 1;
        if window.count > self.max_attempts {
            log::warn!("login rate limit exceeded for {addr}");
            false
        } else {
            true
        }
    }
}
