// ============================
// crates/portal-lib/src/auth/service.rs
// ============================
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::error::ApiError;

/// Username and plaintext password as typed by the user
///
/// The password lives only in memory, is wiped on drop and never printed.
pub struct Credential {
    username: String,
    password: Zeroizing<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Proof that a user passed `authenticate`
///
/// Only the authentication service constructs this, so holding one is the
/// precondition for changing that user's password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    username: String,
    authenticated_at: DateTime<Utc>,
}

impl AuthenticatedUser {
    pub(crate) fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            authenticated_at: Utc::now(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn authenticated_at(&self) -> DateTime<Utc> {
        self.authenticated_at
    }
}

/// Why a login was refused; for logs only, never shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The hash did not match
    BadPassword,
    /// No such account, or it is locked or has no usable hash
    UnknownUser,
    /// The administrative API failed
    Backend(ApiError),
    /// Correct password, but the account logs in with a one-time code too
    TwoFactorRequired,
}

impl RejectReason {
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::BadPassword => "bad_password",
            RejectReason::UnknownUser => "unknown_user",
            RejectReason::Backend(e) => e.kind(),
            RejectReason::TwoFactorRequired => "two_factor",
        }
    }
}

/// Result of a login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(AuthenticatedUser),
    Rejected(RejectReason),
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated(_))
    }
}

/// Shown when an account with two-factor login is refused
pub const TWO_FACTOR_MESSAGE: &str = "Two-factor authentication is enabled for this account. \
    Please change your password in the TrueNAS web interface.";

/// Failure of a password change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeError {
    /// Re-authentication with the current password failed
    CurrentPasswordIncorrect,
    /// The account has two-factor login configured
    TwoFactorRequired,
    /// The set-password call failed
    Api(ApiError),
}

impl ChangeError {
    /// Message safe to show on the change-password page
    pub fn user_message(&self) -> String {
        match self {
            ChangeError::CurrentPasswordIncorrect => "Current password is incorrect.".to_string(),
            ChangeError::TwoFactorRequired => TWO_FACTOR_MESSAGE.to_string(),
            ChangeError::Api(ApiError::Validation(reason)) => {
                format!("Password change failed: {reason}")
            },
            ChangeError::Api(ApiError::Connectivity(_)) => {
                "Cannot reach the TrueNAS server.".to_string()
            },
            ChangeError::Api(_) => {
                "Password change failed. Please contact your administrator.".to_string()
            },
        }
    }
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Decide a login: SMB probe first, hash verification as fallback
    async fn authenticate(&self, credential: &Credential) -> AuthOutcome;

    /// Re-check `current_password` for `user`, then set `new_password`
    async fn change_password(
        &self,
        user: &AuthenticatedUser,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ChangeError>;

    /// Whether the administrative API is reachable with the configured key
    async fn health_check(&self) -> Result<(), ApiError>;
}
