// ===================================
// tests/integration/login_flow_tests.rs
// ===================================
//! Login, logout and session handling through the router
use axum::http::{header, StatusCode};

use crate::test_utils::*;

fn portal() -> TestPortal {
    TestPortal::new(
        FakeSmb::new(&[("alice", "Secret123!")]),
        FakeNas::new(&[("alice", "Secret123!"), ("bob", "HashOnly99")]),
    )
}

#[tokio::test]
async fn test_index_redirects_to_login() {
    let portal = portal();
    let response = portal.send(get("/", None)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login"));
}

#[tokio::test]
async fn test_login_page_renders_form() {
    let portal = portal();
    let response = portal.send(get("/login", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("name=\"username\""));
    assert!(body.contains("name=\"password\""));
}

#[tokio::test]
async fn test_smb_accepted_login_sets_cookie_and_redirects() {
    let portal = portal();
    let response = portal.send(login_request("alice", "Secret123!", "192.0.2.1")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/change-password"));

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("truenas_passwd_session="));
    assert!(set_cookie.contains("HttpOnly"));

    // SMB confirms the password; the API only supplies the account record
    assert_eq!(portal.smb.probe_count(), 1);
    assert_eq!(portal.nas.query_count(), 1);
}

#[tokio::test]
async fn test_two_factor_account_is_sent_to_truenas() {
    for smb in [FakeSmb::new(&[("carol", "Carol2fa!")]), FakeSmb::unavailable()] {
        let portal = TestPortal::new(smb, FakeNas::new(&[("carol", "Carol2fa!")]).with_two_factor("carol"));
        let response = portal.send(login_request("carol", "Carol2fa!", "192.0.2.2")).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(session_cookie(&response).is_none());
        assert!(body_string(response)
            .await
            .contains("Two-factor authentication is enabled for this account."));
    }

    // A wrong password still gets the generic message
    let portal = TestPortal::new(
        FakeSmb::new(&[]),
        FakeNas::new(&[("carol", "Carol2fa!")]).with_two_factor("carol"),
    );
    let response = portal.send(login_request("carol", "not-it-1", "192.0.2.2")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_string(response).await.contains("Invalid username or password."));
}

#[tokio::test]
async fn test_login_falls_back_to_stored_hash() {
    let portal = portal();
    let response = portal.send(login_request("bob", "HashOnly99", "192.0.2.1")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/change-password"));
    assert_eq!(portal.nas.query_count(), 1);
}

#[tokio::test]
async fn test_login_with_smb_down_uses_stored_hash() {
    let portal = TestPortal::new(
        FakeSmb::unavailable(),
        FakeNas::new(&[("alice", "Secret123!")]),
    );
    let response = portal.send(login_request("alice", "Secret123!", "192.0.2.1")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(session_cookie(&response).is_some());
}

#[tokio::test]
async fn test_wrong_password_shows_generic_message() {
    let portal = portal();
    let response = portal.send(login_request("alice", "wrong-pass", "192.0.2.1")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let body = body_string(response).await;
    assert!(body.contains("Invalid username or password."));
    assert!(body.contains("value=\"alice\""));
    assert!(!body.contains("wrong-pass"));
}

#[tokio::test]
async fn test_unknown_user_gets_the_same_message() {
    let portal = portal();
    let response = portal.send(login_request("mallory", "whatever1", "192.0.2.1")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_string(response).await.contains("Invalid username or password."));
}

#[tokio::test]
async fn test_unreachable_api_gets_the_same_message() {
    let portal = TestPortal::new(FakeSmb::new(&[]), FakeNas::unreachable());
    let response = portal.send(login_request("alice", "Secret123!", "192.0.2.1")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_string(response).await.contains("Invalid username or password."));
}

#[tokio::test]
async fn test_invalid_form_is_rejected_before_authentication() {
    let portal = portal();
    let response = portal.send(login_request("", "", "192.0.2.1")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_string(response).await;
    assert!(body.contains("Username is required"));
    assert!(body.contains("Password is required"));
    assert_eq!(portal.smb.probe_count(), 0);
}

#[tokio::test]
async fn test_protected_page_requires_login() {
    let portal = portal();
    let response = portal.send(get("/change-password", None)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login?notice=login-required"));

    let response = portal.send(get("/login?notice=login-required", None)).await;
    assert!(body_string(response).await.contains("Please log in to access this page."));
}

#[tokio::test]
async fn test_forged_cookie_is_ignored() {
    let portal = portal();
    let real = portal.login("alice", "Secret123!").await;
    let (_, value) = real.split_once('=').unwrap();
    let (token, _) = value.rsplit_once('.').unwrap();

    for forged in [
        "truenas_passwd_session=forged.AAAA".to_string(),
        format!("truenas_passwd_session={token}"),
        format!("truenas_passwd_session={token}.AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
    ] {
        let response = portal.send(get("/change-password", Some(&forged))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{forged}");
        assert_eq!(location(&response), Some("/login?notice=login-required"));
    }
}

#[tokio::test]
async fn test_logged_in_user_is_sent_to_change_password() {
    let portal = portal();
    let cookie = portal.login("alice", "Secret123!").await;

    let response = portal.send(get("/", Some(&cookie))).await;
    assert_eq!(location(&response), Some("/change-password"));

    let response = portal.send(get("/login", Some(&cookie))).await;
    assert_eq!(location(&response), Some("/change-password"));
}

#[tokio::test]
async fn test_logout_ends_the_session() {
    let portal = portal();
    let cookie = portal.login("alice", "Secret123!").await;

    let response = portal.send(get("/logout", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login?notice=logged-out"));
    let removal = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(removal.contains("Max-Age=0"));

    let response = portal.send(get("/change-password", Some(&cookie))).await;
    assert_eq!(location(&response), Some("/login?notice=login-required"));
    assert!(portal.state.sessions.is_empty().await);
}

#[tokio::test]
async fn test_lockout_after_max_attempts() {
    let mut settings = test_settings();
    settings.rate_limit.max_attempts = 3;
    let portal = TestPortal::with_settings(
        settings,
        FakeSmb::new(&[("alice", "Secret123!")]),
        FakeNas::new(&[("alice", "Secret123!")]),
    );

    for _ in 0..3 {
        let response = portal.send(login_request("alice", "wrong-pass", "192.0.2.50")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let probes = portal.smb.probe_count();
    let queries = portal.nas.query_count();

    // Even the right password is refused while locked out
    let response = portal.send(login_request("alice", "Secret123!", "192.0.2.50")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert!(body_string(response)
        .await
        .contains("Too many login attempts, please try again later."));
    assert_eq!(portal.smb.probe_count(), probes);
    assert_eq!(portal.nas.query_count(), queries);

    // Other addresses are unaffected
    let response = portal.send(login_request("alice", "Secret123!", "192.0.2.51")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_successful_login_resets_failures() {
    let mut settings = test_settings();
    settings.rate_limit.max_attempts = 2;
    let portal = TestPortal::with_settings(
        settings,
        FakeSmb::new(&[("alice", "Secret123!")]),
        FakeNas::new(&[("alice", "Secret123!")]),
    );

    portal.send(login_request("alice", "wrong-pass", "192.0.2.60")).await;
    portal.send(login_request("alice", "Secret123!", "192.0.2.60")).await;
    let response = portal.send(login_request("alice", "wrong-pass", "192.0.2.60")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_healthz() {
    let portal = portal();
    let response = portal.send(get("/healthz", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["status"], "ok");

    let down = TestPortal::new(FakeSmb::new(&[]), FakeNas::unreachable());
    let response = down.send(get("/healthz", None)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"]["code"], "NAS_001");
}
