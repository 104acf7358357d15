// ============================
// crates/portal-lib/src/truenas/mod.rs
// ============================
//! Client for the TrueNAS administrative API.
//!
//! Two transports implement [`AdminApi`]: the REST API under `/api/v2.0`
//! and the JSON-RPC 2.0 WebSocket API. Both authenticate with the
//! long-lived admin key given at construction.

mod rest;
mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use truenas_passwd_common::UserRecord;

use crate::auth::StoredHash;
use crate::config::{ClientKind, TrueNasSettings};
use crate::error::ApiError;

pub use rest::RestClient;
pub use websocket::WebSocketClient;

#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Check that the service is reachable and accepts the admin key
    async fn connect(&self) -> Result<(), ApiError>;

    /// Look up one account by exact username
    async fn query_user(&self, username: &str) -> Result<UserRecord, ApiError>;

    /// Set a new password for an existing account
    async fn set_password(&self, username: &str, new_password: &str) -> Result<(), ApiError>;

    /// The stored password hash of an account, see [`usable_hash`]
    async fn fetch_password_hash(&self, username: &str) -> Result<StoredHash, ApiError> {
        let user = self.query_user(username).await?;
        usable_hash(&user)
    }
}

/// The hash of `user` when it can be used for a login check
///
/// Locked accounts, accounts with password login disabled and accounts
/// without a parseable hash are reported as `NotFound`.
pub fn usable_hash(user: &UserRecord) -> Result<StoredHash, ApiError> {
    if user.locked || user.password_disabled {
        return Err(ApiError::NotFound(format!(
            "{} is locked or has password login disabled",
            user.username
        )));
    }
    let raw = user
        .unixhash
        .as_deref()
        .ok_or_else(|| ApiError::NotFound(format!("{} has no password hash", user.username)))?;
    raw.parse::<StoredHash>()
        .map_err(|e| ApiError::NotFound(format!("{}: {e}", user.username)))
}

/// Build the configured transport
pub fn build_admin_api(settings: &TrueNasSettings) -> Result<Arc<dyn AdminApi>, ApiError> {
    let api: Arc<dyn AdminApi> = match settings.client {
        ClientKind::Rest => Arc::new(RestClient::new(settings)?),
        ClientKind::Websocket => Arc::new(WebSocketClient::new(settings)),
    };
    tracing::info!(
        client = ?settings.client,
        host = %settings.host,
        port = settings.port,
        "admin API client configured"
    );
    Ok(api)
}
