// ========================
// tests/unit/auth_tests.rs
// ========================
//! The login decision and the password change precondition
use std::sync::Arc;

use truenas_passwd_lib::auth::{
    AuthOutcome, AuthService, ChangeError, Credential, DefaultAuth, RejectReason,
};
use truenas_passwd_lib::error::{AppError, ApiError};
use truenas_passwd_lib::AppState;

use crate::test_utils::*;

fn service(smb: FakeSmb, nas: FakeNas) -> (DefaultAuth, Arc<FakeSmb>, Arc<FakeNas>) {
    let smb = Arc::new(smb);
    let nas = Arc::new(nas);
    (DefaultAuth::new(smb.clone(), nas.clone()), smb, nas)
}

#[tokio::test]
async fn test_smb_accept_needs_only_the_account_record() {
    // The stored hash is stale; SMB holds the current password
    let (auth, smb, nas) = service(
        FakeSmb::new(&[("alice", "pw-alice")]),
        FakeNas::new(&[("alice", "pw-alice-old")]),
    );

    let outcome = auth.authenticate(&Credential::new("alice", "pw-alice")).await;
    match outcome {
        AuthOutcome::Authenticated(user) => assert_eq!(user.username(), "alice"),
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(smb.probe_count(), 1);
    assert_eq!(nas.query_count(), 1);
}

#[tokio::test]
async fn test_smb_accept_without_account_record_is_refused() {
    let (auth, _, _) = service(FakeSmb::new(&[("alice", "pw-alice")]), FakeNas::new(&[]));

    assert_eq!(
        auth.authenticate(&Credential::new("alice", "pw-alice")).await,
        AuthOutcome::Rejected(RejectReason::UnknownUser)
    );
}

#[tokio::test]
async fn test_two_factor_accounts_are_refused() {
    let nas = || FakeNas::new(&[("carol", "pw-carol-1")]).with_two_factor("carol");

    // SMB accepts
    let (auth, _, _) = service(FakeSmb::new(&[("carol", "pw-carol-1")]), nas());
    assert_eq!(
        auth.authenticate(&Credential::new("carol", "pw-carol-1")).await,
        AuthOutcome::Rejected(RejectReason::TwoFactorRequired)
    );

    // Stored hash
    let (auth, _, nas) = service(FakeSmb::unavailable(), nas());
    assert_eq!(
        auth.authenticate(&Credential::new("carol", "pw-carol-1")).await,
        AuthOutcome::Rejected(RejectReason::TwoFactorRequired)
    );
    assert_eq!(
        auth.authenticate(&Credential::new("carol", "pw-carol-2")).await,
        AuthOutcome::Rejected(RejectReason::BadPassword)
    );
    assert!(nas.updated().is_empty());
}

#[tokio::test]
async fn test_hash_fallback_outcomes() {
    let (auth, _, _) = service(FakeSmb::new(&[]), FakeNas::new(&[("bob", "pw-bob-123")]));

    assert!(auth
        .authenticate(&Credential::new("bob", "pw-bob-123"))
        .await
        .is_authenticated());
    assert_eq!(
        auth.authenticate(&Credential::new("bob", "pw-bob-124")).await,
        AuthOutcome::Rejected(RejectReason::BadPassword)
    );
    assert_eq!(
        auth.authenticate(&Credential::new("nobody", "pw")).await,
        AuthOutcome::Rejected(RejectReason::UnknownUser)
    );
}

#[tokio::test]
async fn test_unreachable_api_is_a_backend_rejection() {
    let (auth, _, _) = service(FakeSmb::unavailable(), FakeNas::unreachable());

    let outcome = auth.authenticate(&Credential::new("alice", "pw")).await;
    assert!(matches!(
        outcome,
        AuthOutcome::Rejected(RejectReason::Backend(ApiError::Connectivity(_)))
    ));
    assert!(auth.health_check().await.is_err());
}

#[tokio::test]
async fn test_change_requires_current_password() {
    let (auth, _, nas) = service(FakeSmb::new(&[]), FakeNas::new(&[("bob", "pw-bob-123")]));
    let AuthOutcome::Authenticated(user) =
        auth.authenticate(&Credential::new("bob", "pw-bob-123")).await
    else {
        panic!("bob should log in");
    };

    let result = auth.change_password(&user, "guess", "NewPassw0rd").await;
    assert_eq!(result, Err(ChangeError::CurrentPasswordIncorrect));
    assert!(nas.updated().is_empty());

    auth.change_password(&user, "pw-bob-123", "NewPassw0rd")
        .await
        .unwrap();
    assert_eq!(nas.updated(), vec![("bob".to_string(), "NewPassw0rd".to_string())]);
}

#[test]
fn test_app_state_needs_secret_key() {
    let mut settings = test_settings();
    settings.secret_key = None;
    let (auth, _, _) = service(FakeSmb::new(&[]), FakeNas::new(&[]));

    let result = AppState::new(settings, Arc::new(auth));
    assert!(matches!(result, Err(AppError::Config(_))));
}
