// ABOUTME: IP-level login rate limiter with a fixed counting window and block state
// ABOUTME: Sits in front of the host's account-level lockout as the first defense tier
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Login Rate Limiter
//!
//! Per-IP state machine: `clean -> counting(1..max-1) -> blocked`.
//! The window is fixed: when it expires without reaching the threshold the
//! count resets, never carrying partial counts over. Crossing the
//! threshold blocks the IP for the block duration; further failures while
//! blocked are no-ops, and once the block lapses the next failure starts a
//! fresh count of 1.

use crate::config::RateLimitConfig;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Instant;

/// Outcome of recording a login failure.
#[derive(Debug, Clone, Copy)]
pub struct FailureOutcome {
    /// Whether this failure crossed the threshold (or the IP was already blocked)
    pub blocked_now: bool,
    /// Failures left before the IP is blocked
    pub remaining_attempts: u32,
}

struct RateLimiterState {
    /// Per-IP failure tracking: IP -> (`failure_count`, `window_start`)
    attempts: HashMap<IpAddr, (u32, Instant)>,
    /// Blocked IPs and when their block lapses
    blocked_until: HashMap<IpAddr, Instant>,
}

/// IP-keyed login throttle.
pub struct LoginRateLimiter {
    state: Mutex<RateLimiterState>,
    config: RateLimitConfig,
}

impl LoginRateLimiter {
    /// Limiter with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Limiter with custom configuration.
    #[must_use]
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(RateLimiterState {
                attempts: HashMap::new(),
                blocked_until: HashMap::new(),
            }),
            config,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RateLimiterState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("login rate limiter lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether an IP is currently blocked.
    #[must_use]
    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut state = self.lock_state();
        match state.blocked_until.get(&ip) {
            Some(until) if now < *until => true,
            Some(_) => {
                // Block lapsed; the IP returns to clean with no carry-over
                state.blocked_until.remove(&ip);
                state.attempts.remove(&ip);
                false
            }
            None => false,
        }
    }

    /// Record a failed login attempt for an IP.
    ///
    /// The increment and threshold comparison happen atomically per IP.
    /// Failures while blocked are no-ops returning `(blocked, 0)`.
    pub fn record_failure(&self, ip: IpAddr) -> FailureOutcome {
        let now = Instant::now();
        let mut state = self.lock_state();

        match state.blocked_until.get(&ip) {
            Some(until) if now < *until => {
                // Already blocked: do not extend the block
                return FailureOutcome {
                    blocked_now: true,
                    remaining_attempts: 0,
                };
            }
            Some(_) => {
                // Block lapsed; discard the prior count entirely
                state.blocked_until.remove(&ip);
                state.attempts.remove(&ip);
            }
            None => {}
        }

        let entry = state.attempts.entry(ip).or_insert((0, now));
        let (count, window_start) = entry;

        // Fixed window: expiry resets the count, never carries it over
        if now.duration_since(*window_start) >= self.config.window {
            *count = 0;
            *window_start = now;
        }

        *count += 1;

        if *count >= self.config.max_attempts {
            state.attempts.remove(&ip);
            state
                .blocked_until
                .insert(ip, now + self.config.block_duration);
            tracing::warn!(
                "IP {ip} blocked after {} failed login attempts",
                self.config.max_attempts
            );
            return FailureOutcome {
                blocked_now: true,
                remaining_attempts: 0,
            };
        }

        FailureOutcome {
            blocked_now: false,
            remaining_attempts: self.config.max_attempts - *count,
        }
    }

    /// Clear an IP's failure count. Call on successful login.
    pub fn reset(&self, ip: IpAddr) {
        let mut state = self.lock_state();
        state.attempts.remove(&ip);
    }

    /// Manually lift a block (operator override).
    pub fn unblock(&self, ip: IpAddr) {
        let mut state = self.lock_state();
        if state.blocked_until.remove(&ip).is_some() {
            tracing::info!("IP {ip} manually unblocked");
        }
        state.attempts.remove(&ip);
    }

    /// Drop stale window entries and lapsed blocks. Returns how many
    /// entries were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock_state();
        let before = state.attempts.len() + state.blocked_until.len();
        let window = self.config.window;
        state
            .attempts
            .retain(|_, (_, start)| now.duration_since(*start) < window);
        state.blocked_until.retain(|_, until| now < *until);
        before - (state.attempts.len() + state.blocked_until.len())
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
