// ==============================
// tests/unit/rate_limit_tests.rs
// ==============================
//! This test suite is designed to validate the functionality of the `AuthRateLimiter`
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use truenas_passwd_lib::auth::AuthRateLimiter;
use truenas_passwd_lib::config::RateLimitSettings;

#[test]
fn test_rate_limiter_allows_initial_attempts() {
    let rate_limiter = AuthRateLimiter::default();
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    assert!(rate_limiter.check_rate_limit(ip));
}

#[test]
fn test_rate_limiter_blocks_after_max_attempts() {
    let rate_limiter = AuthRateLimiter::default();
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2));

    // Default max is 5
    for _ in 0..4 {
        rate_limiter.record_failed_attempt(ip);
    }
    assert!(rate_limiter.check_rate_limit(ip));

    rate_limiter.record_failed_attempt(ip);
    assert!(!rate_limiter.check_rate_limit(ip));
}

#[test]
fn test_rate_limiter_resets_after_success() {
    let rate_limiter = AuthRateLimiter::default();
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 3));

    for _ in 0..3 {
        rate_limiter.record_failed_attempt(ip);
    }
    rate_limiter.record_success(ip);

    // A full budget again
    for _ in 0..4 {
        rate_limiter.record_failed_attempt(ip);
    }
    assert!(rate_limiter.check_rate_limit(ip));

    rate_limiter.record_failed_attempt(ip);
    assert!(!rate_limiter.check_rate_limit(ip));
}

#[test]
fn test_different_ips_tracked_separately() {
    let rate_limiter = AuthRateLimiter::new(2, Duration::from_secs(60));
    let ip1 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    let ip2 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    rate_limiter.record_failed_attempt(ip1);
    rate_limiter.record_failed_attempt(ip1);

    assert!(!rate_limiter.check_rate_limit(ip1));
    assert!(rate_limiter.check_rate_limit(ip2));
}

#[test]
fn test_from_settings() {
    let settings = RateLimitSettings {
        max_attempts: 1,
        lockout_secs: 60,
    };
    let rate_limiter = AuthRateLimiter::from_settings(&settings);
    let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));

    rate_limiter.record_failed_attempt(ip);
    assert!(!rate_limiter.check_rate_limit(ip));
    assert_eq!(rate_limiter.tracked(), 1);
}

#[test]
fn test_cleanup_keeps_active_lockouts() {
    let rate_limiter = AuthRateLimiter::new(1, Duration::from_secs(60));
    let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 4));

    rate_limiter.record_failed_attempt(ip);
    rate_limiter.cleanup();

    assert_eq!(rate_limiter.tracked(), 1);
    assert!(!rate_limiter.check_rate_limit(ip));
}
