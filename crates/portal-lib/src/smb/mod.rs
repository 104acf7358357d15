// ============================
// crates/portal-lib/src/smb/mod.rs
// ============================
//! SMB credential probe.
//!
//! Checks a username and password by running an SMB2 session setup with
//! NTLMv2 against the file server. Nothing is mounted or read: the session
//! is logged off as soon as the server has answered.

mod ntlm;
mod packet;
mod spnego;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::{Settings, SmbSettings};
use packet::{status, Connection, SessionSetupResponse};

/// Workstation name sent in the AUTHENTICATE message
const WORKSTATION: &str = "PASSWD-PORTAL";

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The server accepted the password
    Accepted,
    /// The server answered and refused the password or granted only guest access
    Rejected,
    /// No verdict: connection, timeout or protocol trouble
    Unavailable(String),
}

impl ProbeOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, ProbeOutcome::Accepted)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Accepted => "accepted",
            ProbeOutcome::Rejected => "rejected",
            ProbeOutcome::Unavailable(_) => "unavailable",
        }
    }
}

#[derive(Error, Debug)]
pub enum SmbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error("{step} failed with status {status:#010x}")]
    Status { step: &'static str, status: u32 },

    #[error("crypto error: {0}")]
    Crypto(String),
}

#[async_trait]
pub trait SmbProbe: Send + Sync {
    async fn probe(&self, username: &str, password: &str) -> ProbeOutcome;
}

/// Probe used when SMB checking is switched off
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledProbe;

#[async_trait]
impl SmbProbe for DisabledProbe {
    async fn probe(&self, _username: &str, _password: &str) -> ProbeOutcome {
        ProbeOutcome::Unavailable("disabled".to_string())
    }
}

/// SMB2 + NTLMv2 probe against one server
#[derive(Debug, Clone)]
pub struct NtlmSmbProbe {
    host: String,
    port: u16,
    domain: String,
    timeout: Duration,
}

impl NtlmSmbProbe {
    pub fn new(host: impl Into<String>, settings: &SmbSettings) -> Self {
        Self {
            host: host.into(),
            port: settings.port,
            domain: settings.domain.clone(),
            timeout: settings.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn session_setup(&self, username: &str, password: &str) -> Result<ProbeOutcome, SmbError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;
        let mut conn = Connection::new(stream);

        let (header, reply) = conn
            .request(packet::NEGOTIATE, &packet::negotiate_request(uuid::Uuid::new_v4().as_bytes())?)
            .await?;
        if header.status != status::SUCCESS {
            return Err(SmbError::Status {
                step: "negotiate",
                status: header.status,
            });
        }
        let dialect = packet::negotiated_dialect(&reply)?;
        tracing::trace!(dialect = %format!("{dialect:#06x}"), "SMB dialect negotiated");

        let token = spnego::wrap_negotiate(&ntlm::negotiate_message());
        let (header, reply) = conn
            .request(packet::SESSION_SETUP, &packet::session_setup_request(&token)?)
            .await?;
        if header.status != status::MORE_PROCESSING_REQUIRED {
            return Err(SmbError::Status {
                step: "session setup",
                status: header.status,
            });
        }
        conn.session_id = header.session_id;

        let setup = SessionSetupResponse::parse(&reply)?;
        let challenge = ntlm::Challenge::parse(spnego::unwrap_response(&setup.security_blob)?)?;
        let identity = ntlm::Identity {
            username,
            domain: &self.domain,
            workstation: WORKSTATION,
            password,
        };
        let authenticate = ntlm::authenticate_message(&challenge, &identity, &rand::random())?;

        let token = spnego::wrap_response(&authenticate);
        let (header, reply) = conn
            .request(packet::SESSION_SETUP, &packet::session_setup_request(&token)?)
            .await?;

        let outcome = match header.status {
            status::SUCCESS => {
                let setup = SessionSetupResponse::parse(&reply)?;
                if setup.is_guest_or_anonymous() {
                    tracing::debug!(username, "SMB mapped the login to a guest session");
                    ProbeOutcome::Rejected
                } else {
                    if let Err(e) = conn.request(packet::LOGOFF, &packet::logoff_request()).await {
                        tracing::trace!(error = %e, "SMB logoff failed");
                    }
                    ProbeOutcome::Accepted
                }
            },
            // The password was right; it only needs changing
            status::PASSWORD_EXPIRED | status::PASSWORD_MUST_CHANGE => ProbeOutcome::Accepted,
            other => {
                tracing::debug!(
                    username,
                    status = %format!("{other:#010x}"),
                    logon_failure = other == status::LOGON_FAILURE,
                    "SMB refused the credentials"
                );
                ProbeOutcome::Rejected
            },
        };
        Ok(outcome)
    }
}

#[async_trait]
impl SmbProbe for NtlmSmbProbe {
    async fn probe(&self, username: &str, password: &str) -> ProbeOutcome {
        match tokio::time::timeout(self.timeout, self.session_setup(username, password)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::debug!(username, host = %self.host, error = %e, "SMB probe unavailable");
                ProbeOutcome::Unavailable(e.to_string())
            },
            Err(_) => {
                tracing::debug!(username, host = %self.host, "SMB probe timed out");
                ProbeOutcome::Unavailable(format!("no answer within {:?}", self.timeout))
            },
        }
    }
}

/// The configured probe: NTLM against the TrueNAS host, or disabled
pub fn build_probe(settings: &Settings) -> Arc<dyn SmbProbe> {
    if settings.smb.enabled {
        Arc::new(NtlmSmbProbe::new(settings.truenas.host.clone(), &settings.smb))
    } else {
        tracing::info!("SMB probe disabled; logins use hash verification only");
        Arc::new(DisabledProbe)
    }
}
