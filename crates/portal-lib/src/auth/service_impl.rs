// ============================
// crates/portal-lib/src/auth/service_impl.rs
// ============================
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use truenas_passwd_common::UserRecord;
use zeroize::Zeroizing;

use crate::auth::{
    AuthOutcome, AuthService, AuthenticatedUser, ChangeError, Credential, RejectReason,
};
use crate::error::ApiError;
use crate::metrics::{
    LOGIN_REJECTED, LOGIN_SUCCESS, PASSWORD_CHANGED, PASSWORD_CHANGE_FAILED, SMB_PROBE,
};
use crate::smb::{ProbeOutcome, SmbProbe};
use crate::truenas::{usable_hash, AdminApi};

/// `Ok` names the method that confirmed the password
type Verdict = Result<&'static str, RejectReason>;

/// SMB probe first, stored-hash verification as the fallback
pub struct DefaultAuth {
    smb: Arc<dyn SmbProbe>,
    api: Arc<dyn AdminApi>,
}

impl DefaultAuth {
    pub fn new(smb: Arc<dyn SmbProbe>, api: Arc<dyn AdminApi>) -> Self {
        Self { smb, api }
    }

    /// Check a credential without touching the login metrics
    async fn verify(&self, credential: &Credential) -> (ProbeOutcome, Verdict) {
        let username = credential.username();
        let smb = self.smb.probe(username, credential.password()).await;

        let verdict = match &smb {
            ProbeOutcome::Accepted => self.check_account(username).await.map(|()| "smb"),
            ProbeOutcome::Rejected => {
                tracing::debug!(username, "SMB rejected the login, checking the stored hash");
                self.verify_stored_hash(credential).await.map(|()| "hash")
            },
            ProbeOutcome::Unavailable(reason) => {
                tracing::debug!(username, %reason, "SMB probe gave no verdict, checking the stored hash");
                self.verify_stored_hash(credential).await.map(|()| "hash")
            },
        };
        (smb, verdict)
    }

    /// Account checks once SMB has confirmed the password
    async fn check_account(&self, username: &str) -> Result<(), RejectReason> {
        let user = self
            .api
            .query_user(username)
            .await
            .map_err(|e| lookup_failure(username, e))?;
        refuse_two_factor(&user)
    }

    async fn verify_stored_hash(&self, credential: &Credential) -> Result<(), RejectReason> {
        let username = credential.username();
        let user = self
            .api
            .query_user(username)
            .await
            .map_err(|e| lookup_failure(username, e))?;
        let hash = usable_hash(&user).map_err(|e| lookup_failure(username, e))?;

        let plaintext = Zeroizing::new(credential.password().to_string());
        // sha-crypt is deliberately slow
        let verified = tokio::task::spawn_blocking(move || hash.verify(&plaintext))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "hash verification task failed");
                false
            });

        if !verified {
            return Err(RejectReason::BadPassword);
        }
        refuse_two_factor(&user)
    }
}

fn lookup_failure(username: &str, error: ApiError) -> RejectReason {
    match error {
        ApiError::NotFound(detail) => {
            tracing::debug!(username, %detail, "no usable account");
            RejectReason::UnknownUser
        },
        other => RejectReason::Backend(other),
    }
}

// Only reached with a confirmed password, so the refusal reveals nothing
fn refuse_two_factor(user: &UserRecord) -> Result<(), RejectReason> {
    if user.twofactor_auth_configured {
        Err(RejectReason::TwoFactorRequired)
    } else {
        Ok(())
    }
}

#[async_trait]
impl AuthService for DefaultAuth {
    async fn authenticate(&self, credential: &Credential) -> AuthOutcome {
        let username = credential.username();

        let (smb, verdict) = self.verify(credential).await;
        counter!(SMB_PROBE, "outcome" => smb.label()).increment(1);

        match verdict {
            Ok(method) => {
                tracing::info!(username, method, "login accepted");
                counter!(LOGIN_SUCCESS, "method" => method).increment(1);
                AuthOutcome::Authenticated(AuthenticatedUser::new(username))
            },
            Err(reason) => {
                match &reason {
                    RejectReason::Backend(e) => {
                        tracing::warn!(username, error = %e, "login rejected: admin API failed");
                    },
                    other => {
                        tracing::info!(username, reason = other.label(), "login rejected");
                    },
                }
                counter!(LOGIN_REJECTED, "reason" => reason.label()).increment(1);
                AuthOutcome::Rejected(reason)
            },
        }
    }

    async fn change_password(
        &self,
        user: &AuthenticatedUser,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ChangeError> {
        let username = user.username();

        let recheck = Credential::new(username, current_password);
        if let (_, Err(reason)) = self.verify(&recheck).await {
            tracing::info!(username, reason = reason.label(), "password change refused: current password not confirmed");
            counter!(PASSWORD_CHANGE_FAILED, "reason" => reason.label()).increment(1);
            return Err(match reason {
                RejectReason::BadPassword | RejectReason::UnknownUser => {
                    ChangeError::CurrentPasswordIncorrect
                },
                RejectReason::TwoFactorRequired => ChangeError::TwoFactorRequired,
                RejectReason::Backend(e) => ChangeError::Api(e),
            });
        }

        match self.api.set_password(username, new_password).await {
            Ok(()) => {
                tracing::info!(username, "password changed");
                counter!(PASSWORD_CHANGED).increment(1);
                Ok(())
            },
            Err(e) => {
                tracing::warn!(username, error = %e, "password change failed");
                counter!(PASSWORD_CHANGE_FAILED, "reason" => e.kind()).increment(1);
                Err(ChangeError::Api(e))
            },
        }
    }

    async fn health_check(&self) -> Result<(), ApiError> {
        self.api.connect().await
    }
}
