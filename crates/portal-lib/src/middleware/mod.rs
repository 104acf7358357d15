// ============================
// crates/portal-lib/src/middleware/mod.rs
// ============================
//! Request middleware and extractors for the portal.

pub mod client_ip;
pub mod require_login;

pub use client_ip::ClientIp;
pub use require_login::{require_login, CurrentSession};
