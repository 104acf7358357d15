// ============================
// crates/portal-lib/src/metrics.rs
// ============================
//! Central place for metric keys
pub const LOGIN_ATTEMPT: &str = "login.attempt";
pub const LOGIN_SUCCESS: &str = "login.success";
pub const LOGIN_REJECTED: &str = "login.rejected";
pub const LOGIN_THROTTLED: &str = "login.throttled";
pub const SMB_PROBE: &str = "smb.probe";
pub const PASSWORD_CHANGED: &str = "password.changed";
pub const PASSWORD_CHANGE_FAILED: &str = "password.change_failed";
pub const SESSION_ACTIVE: &str = "session.active";
pub const SESSION_EXPIRED: &str = "session.expired";
