// ============================
// crates/portal-lib/src/auth/session.rs
// ============================
//! Browser sessions: server-side state behind a signed cookie.
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use metrics::{counter, gauge};
use rand::RngCore;
use sha2::Sha256;
use tokio::sync::RwLock;

use super::AuthenticatedUser;
use crate::error::AppError;
use crate::metrics::{SESSION_ACTIVE, SESSION_EXPIRED};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "truenas_passwd_session";

/// Random bytes per session token (256 bits)
const TOKEN_BYTES: usize = 32;

/// Severity of a one-shot page message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashLevel {
    Success,
    Info,
}

impl FlashLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
        }
    }
}

/// Message shown once on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn new(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Session information
#[derive(Clone, Debug)]
pub struct Session {
    pub user: AuthenticatedUser,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    flashes: Vec<Flash>,
}

impl Session {
    pub fn username(&self) -> &str {
        self.user.username()
    }

    fn is_live(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }
}

/// Signs session tokens so a cookie cannot name a token it was not given
#[derive(Clone)]
struct CookieSigner {
    keyed: Hmac<Sha256>,
}

impl CookieSigner {
    fn new(secret: &[u8]) -> Result<Self, AppError> {
        let keyed = Hmac::<Sha256>::new_from_slice(secret)
            .map_err(|e| AppError::Config(format!("invalid secret_key: {e}")))?;
        Ok(Self { keyed })
    }

    fn mac(&self) -> Hmac<Sha256> {
        self.keyed.clone()
    }

    fn sign(&self, token: &str) -> String {
        let mut mac = self.mac();
        mac.update(token.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{token}.{sig}")
    }

    /// Returns the token of a correctly signed cookie value
    fn verify<'a>(&self, cookie_value: &'a str) -> Option<&'a str> {
        let (token, sig) = cookie_value.rsplit_once('.')?;
        let sig = URL_SAFE_NO_PAD.decode(sig).ok()?;
        let mut mac = self.mac();
        mac.update(token.as_bytes());
        mac.verify_slice(&sig).ok()?;
        Some(token)
    }
}

/// Session manager for browser logins
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    signer: CookieSigner,
    ttl: Duration,
}

impl SessionManager {
    /// Create a new session manager signing cookies with `secret`
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, AppError> {
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            signer: CookieSigner::new(secret)?,
            ttl,
        })
    }

    /// Start a session for an authenticated user; returns the cookie value
    pub async fn create(&self, user: AuthenticatedUser) -> String {
        let token = generate_token();
        let now = SystemTime::now();
        let session = Session {
            user,
            created_at: now,
            expires_at: now + self.ttl,
            flashes: Vec::new(),
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(token.clone(), session);
        gauge!(SESSION_ACTIVE).set(sessions.len() as f64);

        self.signer.sign(&token)
    }

    /// Look up a live session by cookie value
    pub async fn get(&self, cookie_value: &str) -> Option<Session> {
        let token = self.signer.verify(cookie_value)?;
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|s| s.is_live(SystemTime::now()))
            .cloned()
    }

    /// Queue a message for the next page rendered in this session
    pub async fn flash(&self, cookie_value: &str, flash: Flash) {
        let Some(token) = self.signer.verify(cookie_value) else {
            return;
        };
        if let Some(session) = self.sessions.write().await.get_mut(token) {
            session.flashes.push(flash);
        }
    }

    /// Remove and return the queued messages
    pub async fn take_flashes(&self, cookie_value: &str) -> Vec<Flash> {
        let Some(token) = self.signer.verify(cookie_value) else {
            return Vec::new();
        };
        self.sessions
            .write()
            .await
            .get_mut(token)
            .map(|s| std::mem::take(&mut s.flashes))
            .unwrap_or_default()
    }

    /// End a session
    pub async fn destroy(&self, cookie_value: &str) {
        let Some(token) = self.signer.verify(cookie_value) else {
            return;
        };
        let mut sessions = self.sessions.write().await;
        sessions.remove(token);
        gauge!(SESSION_ACTIVE).set(sessions.len() as f64);
    }

    /// Number of stored sessions, live or not yet purged
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired sessions; returns how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = SystemTime::now();
        let before_count = sessions.len();

        sessions.retain(|_, session| session.is_live(now));

        let after_count = sessions.len();
        let removed = before_count - after_count;

        if removed > 0 {
            counter!(SESSION_EXPIRED).increment(removed as u64);
            gauge!(SESSION_ACTIVE).set(after_count as f64);
            tracing::debug!(removed, "purged expired sessions");
        }
        removed
    }

    /// `Set-Cookie` value carrying a session
    pub fn cookie(&self, cookie_value: &str, secure: bool) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE}={cookie_value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.ttl.as_secs()
        );
        if secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that removes the session cookie
    pub fn removal_cookie(secure: bool) -> String {
        let mut cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
        if secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// The session cookie value sent by the browser, if any
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// 256-bit random token, base64url without padding
fn generate_token() -> String {
    let mut buffer = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}
