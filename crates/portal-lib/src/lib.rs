// ============================
// crates/portal-lib/src/lib.rs
// ============================
//! Self-service password changes for TrueNAS users.
//!
//! Users log in with their current credentials, checked by an SMB probe
//! or against the stored hash, and set a new password through the TrueNAS
//! administrative API.

pub mod auth;
pub mod config;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod smb;
pub mod truenas;
pub mod views;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::auth::{AuthRateLimiter, AuthService, DefaultAuth, SessionManager};
use crate::config::Settings;
use crate::error::AppError;

pub use router::create_router;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Authentication service
    pub auth: Arc<dyn AuthService>,
    /// Browser sessions
    pub sessions: SessionManager,
    /// Settings, immutable after startup
    pub settings: Arc<Settings>,
    /// Failed-login throttling per client address
    pub login_limiter: AuthRateLimiter,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Create application state around an authentication service
    pub fn new(settings: Settings, auth: Arc<dyn AuthService>) -> Result<Self, AppError> {
        let secret = settings
            .secret_key
            .as_ref()
            .ok_or_else(|| AppError::Config("secret_key is not set".to_string()))?;
        let sessions = SessionManager::new(
            secret.expose().as_bytes(),
            Duration::from_secs(settings.session.ttl_secs),
        )?;
        let login_limiter = AuthRateLimiter::from_settings(&settings.rate_limit);

        Ok(Self {
            auth,
            sessions,
            settings: Arc::new(settings),
            login_limiter,
        })
    }

    /// Create application state with the configured SMB probe and admin API
    pub fn from_settings(settings: Settings) -> Result<Self, AppError> {
        let api = truenas::build_admin_api(&settings.truenas)?;
        let smb = smb::build_probe(&settings);
        let auth = Arc::new(DefaultAuth::new(smb, api));
        Self::new(settings, auth)
    }

    /// Periodically purge expired sessions and stale login failures
    pub fn spawn_maintenance(&self, every: Duration) -> JoinHandle<()> {
        let sessions = self.sessions.clone();
        let limiter = self.login_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                sessions.cleanup_expired().await;
                limiter.cleanup();
            }
        })
    }
}
