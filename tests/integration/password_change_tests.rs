// =========================================
// tests/integration/password_change_tests.rs
// =========================================
//! Changing a password through the web UI
use axum::http::StatusCode;

use crate::test_utils::*;

const IP: &str = "192.0.2.20";

fn change_form<'a>(current: &'a str, new: &'a str, confirm: &'a str) -> [(&'static str, &'a str); 3] {
    [
        ("current_password", current),
        ("new_password", new),
        ("confirm_password", confirm),
    ]
}

fn portal() -> TestPortal {
    TestPortal::new(
        FakeSmb::new(&[]),
        FakeNas::new(&[("alice", "OldPassw0rd")]),
    )
}

#[tokio::test]
async fn test_full_password_change_flow() {
    let portal = portal();
    let cookie = portal.login("alice", "OldPassw0rd").await;

    // The login flash shows once
    let response = portal.send(get("/change-password", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("<strong>alice</strong>"));
    assert!(body.contains("Login successful!"));

    let response = portal.send(get("/change-password", Some(&cookie))).await;
    assert!(!body_string(response).await.contains("Login successful!"));

    let form = change_form("OldPassw0rd", "NewPassw0rd", "NewPassw0rd");
    let response = portal
        .send(post_form("/change-password", &form, Some(&cookie), IP))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/change-password"));
    assert_eq!(
        portal.nas.updated(),
        vec![("alice".to_string(), "NewPassw0rd".to_string())]
    );

    let response = portal.send(get("/change-password", Some(&cookie))).await;
    assert!(body_string(response)
        .await
        .contains("Password changed successfully!"));

    portal.send(get("/logout", Some(&cookie))).await;

    // Only the new password logs in now
    let response = portal.send(login_request("alice", "OldPassw0rd", IP)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = portal.send(login_request("alice", "NewPassw0rd", IP)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_wrong_current_password_changes_nothing() {
    let portal = portal();
    let cookie = portal.login("alice", "OldPassw0rd").await;

    let form = change_form("NotMyPassw0rd", "NewPassw0rd", "NewPassw0rd");
    let response = portal
        .send(post_form("/change-password", &form, Some(&cookie), IP))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response)
        .await
        .contains("Current password is incorrect."));
    assert!(portal.nas.updated().is_empty());
}

#[tokio::test]
async fn test_mismatched_confirmation_is_rejected() {
    let portal = portal();
    let cookie = portal.login("alice", "OldPassw0rd").await;
    let queries = portal.nas.query_count();

    let form = change_form("OldPassw0rd", "NewPassw0rd", "NewPassw0rd2");
    let response = portal
        .send(post_form("/change-password", &form, Some(&cookie), IP))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("Passwords must match"));
    assert_eq!(portal.nas.query_count(), queries);
    assert!(portal.nas.updated().is_empty());
}

#[tokio::test]
async fn test_server_side_rejection_is_shown() {
    let portal = portal();
    let cookie = portal.login("alice", "OldPassw0rd").await;

    let form = change_form("OldPassw0rd", "short", "short");
    let response = portal
        .send(post_form("/change-password", &form, Some(&cookie), IP))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response)
        .await
        .contains("Password change failed: Password too short"));
    assert!(portal.nas.updated().is_empty());
}

#[tokio::test]
async fn test_current_password_guesses_are_throttled() {
    let mut settings = test_settings();
    settings.rate_limit.max_attempts = 3;
    let portal = TestPortal::with_settings(
        settings,
        FakeSmb::new(&[]),
        FakeNas::new(&[("alice", "OldPassw0rd")]),
    );
    let cookie = portal.login("alice", "OldPassw0rd").await;

    for guess in ["Guess0001", "Guess0002", "Guess0003"] {
        let form = change_form(guess, "NewPassw0rd", "NewPassw0rd");
        let response = portal
            .send(post_form("/change-password", &form, Some(&cookie), IP))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    let queries = portal.nas.query_count();

    // Locked out, even with the right current password
    let form = change_form("OldPassw0rd", "NewPassw0rd", "NewPassw0rd");
    let response = portal
        .send(post_form("/change-password", &form, Some(&cookie), IP))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(body_string(response)
        .await
        .contains("Too many login attempts, please try again later."));
    assert_eq!(portal.nas.query_count(), queries);
    assert!(portal.nas.updated().is_empty());

    // The same address cannot log in again either
    let response = portal.send(login_request("alice", "OldPassw0rd", IP)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_change_requires_a_session() {
    let portal = portal();

    let form = change_form("OldPassw0rd", "NewPassw0rd", "NewPassw0rd");
    let response = portal
        .send(post_form("/change-password", &form, None, IP))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login?notice=login-required"));
    assert!(portal.nas.updated().is_empty());
}
