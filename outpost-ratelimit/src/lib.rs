//! A per-key, fixed **tumbling** window rate limiter (spec §3 `RateWindow`,
//! §4.1 C1).
//!
//! Unlike a token-bucket limiter (the teacher's `empath-delivery::RateLimiter`,
//! which refills continuously), a tumbling window resets the whole counter
//! map at once, lazily, the next time `add` is called after `unit_secs` has
//! elapsed. No background timer is required. All state lives behind one
//! `parking_lot::Mutex`, matching the teacher's choice of `parking_lot`
//! over `std::sync::Mutex` for its uncontended fast path.

use std::{
    collections::{HashMap, HashSet},
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Configuration for a [`RateLimiter`] instance (spec §6 `RateLimiter`
/// config block).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Width of the tumbling window, in seconds. Must be `> 0`.
    pub unit_secs: u64,
    /// Maximum number of accepted `add` calls per actor per window. Must
    /// be `> 0`.
    pub max_count: u32,
}

impl RateLimitConfig {
    /// Validate the invariants from spec §3: both fields strictly positive.
    ///
    /// # Errors
    /// Returns a description of the first invariant violated.
    pub fn validate(&self) -> Result<(), String> {
        if self.unit_secs == 0 {
            return Err("unit_secs must be > 0".to_string());
        }
        if self.max_count == 0 {
            return Err("max_count must be > 0".to_string());
        }
        Ok(())
    }
}

struct Window {
    last_reset_unix_sec: u64,
    counter: HashMap<String, u32>,
    logged: HashSet<String>,
}

fn now_unix_sec() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A rolling-window limiter bounding requests per actor key (spec: client
/// IP, mailbox, etc.) for one daemon.
///
/// Created at daemon init and destroyed with the daemon, per spec §3
/// lifetime note: there is no global limiter, each daemon owns its own.
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<Window>,
}

impl RateLimiter {
    /// Construct a limiter for an already-validated config.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(Window {
                last_reset_unix_sec: now_unix_sec(),
                counter: HashMap::new(),
                logged: HashSet::new(),
            }),
        }
    }

    /// Record one event for `actor_key` in the current window.
    ///
    /// Returns `false` iff the post-increment counter would exceed
    /// `max_count` — in which case the counter is left unchanged. When
    /// `log_if_hit` is set, the first rejection of `actor_key` within a
    /// window emits a single `tracing::warn!`.
    pub fn add(&self, actor_key: &str, log_if_hit: bool) -> bool {
        let mut window = self.state.lock();

        let now = now_unix_sec();
        if now.saturating_sub(window.last_reset_unix_sec) >= self.config.unit_secs {
            window.counter.clear();
            window.logged.clear();
            window.last_reset_unix_sec = now;
        }

        let count = window.counter.entry(actor_key.to_string()).or_insert(0);
        if *count >= self.config.max_count {
            if log_if_hit && window.logged.insert(actor_key.to_string()) {
                tracing::warn!(actor = actor_key, max = self.config.max_count, "rate limit exceeded");
            }
            return false;
        }

        *count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{RateLimitConfig, RateLimiter};

    fn limiter(unit_secs: u64, max_count: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig { unit_secs, max_count })
    }

    #[test]
    fn config_rejects_zero_fields() {
        assert!(RateLimitConfig { unit_secs: 0, max_count: 1 }.validate().is_err());
        assert!(RateLimitConfig { unit_secs: 1, max_count: 0 }.validate().is_err());
        assert!(RateLimitConfig { unit_secs: 1, max_count: 1 }.validate().is_ok());
    }

    /// Property 1: at most `max_count` `add` calls return `true` within a
    /// window, for any number of calls.
    #[test]
    fn bounded_within_window() {
        let rl = limiter(10, 10);
        let mut accepted = 0;
        for _ in 0..20 {
            if rl.add("1.2.3.4", true) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 10);
    }

    #[test]
    fn distinct_actors_are_independent() {
        let rl = limiter(10, 1);
        assert!(rl.add("a", true));
        assert!(rl.add("b", true));
        assert!(!rl.add("a", true));
        assert!(!rl.add("b", true));
    }

    #[test]
    fn only_first_rejection_is_logged() {
        let rl = limiter(10, 1);
        assert!(rl.add("a", true));
        assert!(!rl.add("a", true));
        assert!(!rl.add("a", true));
        let window = rl.state.lock();
        assert!(window.logged.contains("a"));
        assert_eq!(window.logged.len(), 1);
    }

    #[test]
    fn window_resets_after_unit_secs_elapses() {
        let rl = limiter(1, 1);
        assert!(rl.add("a", true));
        assert!(!rl.add("a", true));
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(rl.add("a", true));
    }
}
