// ============================
// crates/portal-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod rate_limit;
pub mod session;
pub mod unix_hash;
mod service;
mod service_impl;

pub use rate_limit::AuthRateLimiter;
pub use service::{
    AuthOutcome, AuthService, AuthenticatedUser, ChangeError, Credential, RejectReason,
    TWO_FACTOR_MESSAGE,
};
pub use service_impl::DefaultAuth;
pub use session::{Flash, FlashLevel, Session, SessionManager, SESSION_COOKIE};
pub use unix_hash::{verify, HashAlgorithm, StoredHash};
