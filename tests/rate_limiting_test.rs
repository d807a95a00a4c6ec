// ABOUTME: Unit tests for the login rate limiter
// ABOUTME: Validates fixed-window counting, block transitions, and fresh-start semantics
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use keystone_auth::config::RateLimitConfig;
use keystone_auth::rate_limiting::LoginRateLimiter;
use std::net::{IpAddr, Ipv4Addr};
use std::thread::sleep;
use std::time::Duration;

fn test_ip(last_octet: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(203, 0, 113, last_octet))
}

fn limiter(max_attempts: u32, window_ms: u64, block_ms: u64) -> LoginRateLimiter {
    common::init_tracing();
    LoginRateLimiter::with_config(RateLimitConfig {
        max_attempts,
        window: Duration::from_millis(window_ms),
        block_duration: Duration::from_millis(block_ms),
    })
}

#[test]
fn test_three_failures_block_the_ip() {
    let limiter = limiter(3, 60_000, 60_000);
    let ip = test_ip(1);

    assert!(!limiter.is_blocked(ip));

    let outcome = limiter.record_failure(ip);
    assert!(!outcome.blocked_now);
    assert_eq!(outcome.remaining_attempts, 2);

    let outcome = limiter.record_failure(ip);
    assert!(!outcome.blocked_now);
    assert_eq!(outcome.remaining_attempts, 1);

    let outcome = limiter.record_failure(ip);
    assert!(outcome.blocked_now);
    assert_eq!(outcome.remaining_attempts, 0);

    assert!(limiter.is_blocked(ip));
}

#[test]
fn test_failures_while_blocked_are_noops() {
    let limiter = limiter(3, 60_000, 300);
    let ip = test_ip(2);

    for _ in 0..3 {
        limiter.record_failure(ip);
    }
    assert!(limiter.is_blocked(ip));

    // A failure mid-block neither errors nor extends the block
    sleep(Duration::from_millis(100));
    let outcome = limiter.record_failure(ip);
    assert!(outcome.blocked_now);
    assert_eq!(outcome.remaining_attempts, 0);

    // The block lapses on its original schedule
    sleep(Duration::from_millis(250));
    assert!(!limiter.is_blocked(ip));
}

#[test]
fn test_fresh_count_after_block_lapses() {
    let limiter = limiter(3, 60_000, 150);
    let ip = test_ip(3);

    for _ in 0..3 {
        limiter.record_failure(ip);
    }
    sleep(Duration::from_millis(200));
    assert!(!limiter.is_blocked(ip));

    // The prior count is discarded, not resumed: this is failure 1 of 3
    let outcome = limiter.record_failure(ip);
    assert!(!outcome.blocked_now);
    assert_eq!(outcome.remaining_attempts, 2);
}

#[test]
fn test_window_expiry_resets_count() {
    let limiter = limiter(3, 150, 60_000);
    let ip = test_ip(4);

    limiter.record_failure(ip);
    limiter.record_failure(ip);

    // Let the fixed window lapse; no partial carry-over
    sleep(Duration::from_millis(200));
    let outcome = limiter.record_failure(ip);
    assert!(!outcome.blocked_now);
    assert_eq!(outcome.remaining_attempts, 2);
    assert!(!limiter.is_blocked(ip));
}

#[test]
fn test_reset_on_successful_login() {
    let limiter = limiter(3, 60_000, 60_000);
    let ip = test_ip(5);

    limiter.record_failure(ip);
    limiter.record_failure(ip);
    limiter.reset(ip);

    // Two more failures fit under the threshold again
    limiter.record_failure(ip);
    let outcome = limiter.record_failure(ip);
    assert!(!outcome.blocked_now);
    assert!(!limiter.is_blocked(ip));
}

#[test]
fn test_manual_unblock() {
    let limiter = limiter(2, 60_000, 60_000);
    let ip = test_ip(6);

    limiter.record_failure(ip);
    limiter.record_failure(ip);
    assert!(limiter.is_blocked(ip));

    limiter.unblock(ip);
    assert!(!limiter.is_blocked(ip));

    // And the count starts fresh
    let outcome = limiter.record_failure(ip);
    assert_eq!(outcome.remaining_attempts, 1);
}

#[test]
fn test_ips_are_isolated() {
    let limiter = limiter(2, 60_000, 60_000);
    let blocked_ip = test_ip(7);
    let clean_ip = test_ip(8);

    limiter.record_failure(blocked_ip);
    limiter.record_failure(blocked_ip);
    assert!(limiter.is_blocked(blocked_ip));

    assert!(!limiter.is_blocked(clean_ip));
    let outcome = limiter.record_failure(clean_ip);
    assert!(!outcome.blocked_now);
    assert_eq!(outcome.remaining_attempts, 1);
}

#[test]
fn test_cleanup_drops_stale_entries() {
    let limiter = limiter(2, 100, 100);
    let ip = test_ip(9);

    limiter.record_failure(ip);
    for _ in 0..2 {
        limiter.record_failure(test_ip(10));
    }
    assert!(limiter.is_blocked(test_ip(10)));

    sleep(Duration::from_millis(150));
    let removed = limiter.cleanup_expired();
    assert_eq!(removed, 2);
    assert!(!limiter.is_blocked(test_ip(10)));
}
