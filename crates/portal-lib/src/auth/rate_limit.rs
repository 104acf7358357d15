// ============================
// crates/portal-lib/src/auth/rate_limit.rs
// ============================
//! Login throttling per client address.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitSettings;

/// How long failure counts are remembered without a lockout
const FAILURE_MEMORY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct AttemptEntry {
    failed_attempts: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

/// Locks an address out after repeated failed logins
#[derive(Debug, Clone)]
pub struct AuthRateLimiter {
    attempts: Arc<DashMap<IpAddr, AttemptEntry>>,
    max_attempts: u32,
    lockout_duration: Duration,
}

impl Default for AuthRateLimiter {
    fn default() -> Self {
        Self::from_settings(&RateLimitSettings::default())
    }
}

impl AuthRateLimiter {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            max_attempts,
            lockout_duration,
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_secs(settings.lockout_secs),
        )
    }

    /// Record a failed login
    pub fn record_failed_attempt(&self, ip: IpAddr) {
        let now = Instant::now();

        let mut entry = self.attempts.entry(ip).or_insert_with(|| AttemptEntry {
            failed_attempts: 0,
            last_failure: now,
            locked_until: None,
        });

        // An expired lockout starts a fresh count
        if entry.locked_until.is_some_and(|until| now >= until) {
            entry.failed_attempts = 0;
            entry.locked_until = None;
        }

        entry.failed_attempts += 1;
        entry.last_failure = now;

        if entry.failed_attempts >= self.max_attempts && entry.locked_until.is_none() {
            entry.locked_until = Some(now + self.lockout_duration);
            tracing::warn!(%ip, attempts = entry.failed_attempts, "address locked out of login");
        }
    }

    /// Forget the failures of an address after a successful login
    pub fn record_success(&self, ip: IpAddr) {
        self.attempts.remove(&ip);
    }

    /// Whether an address may attempt a login now
    pub fn check_rate_limit(&self, ip: IpAddr) -> bool {
        match self.attempts.get(&ip) {
            Some(entry) => !entry.locked_until.is_some_and(|until| Instant::now() < until),
            None => true,
        }
    }

    /// Drop expired lockouts and stale failure counts
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.attempts.retain(|_, entry| match entry.locked_until {
            Some(until) => now < until,
            None => now.duration_since(entry.last_failure) < FAILURE_MEMORY,
        });
    }

    pub fn tracked(&self) -> usize {
        self.attempts.len()
    }
}
