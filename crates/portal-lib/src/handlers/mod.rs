// ============================
// crates/portal-lib/src/handlers/mod.rs
// ============================
//! HTTP handlers.

pub mod auth;
pub mod health;
pub mod password;
