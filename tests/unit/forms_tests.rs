// =========================
// tests/unit/forms_tests.rs
// =========================
//! Form validation as seen by the handlers
use truenas_passwd_lib::forms::{FormError, LoginForm, PasswordChangeForm};

fn login(username: &str, password: &str) -> LoginForm {
    LoginForm {
        username: username.to_string(),
        password: password.to_string(),
    }
}

fn change(current: &str, new: &str, confirm: &str) -> PasswordChangeForm {
    PasswordChangeForm {
        current_password: current.to_string(),
        new_password: new.to_string(),
        confirm_password: confirm.to_string(),
    }
}

#[test]
fn test_valid_login_forms() {
    for username in ["alice", "bob.smith", "svc_backup", "first-last", "a", "Jane Doe"] {
        assert!(login(username, "pw").validate().is_ok(), "{username}");
    }
}

#[test]
fn test_login_username_rules() {
    let long = "a".repeat(65);
    assert_eq!(
        login(&long, "pw").validate().unwrap_err(),
        vec![FormError::UsernameLength]
    );
    assert!(login(&"a".repeat(64), "pw").validate().is_ok());

    for bad in [" alice", "alice ", "ali\tce", "ali\u{7}ce"] {
        assert_eq!(
            login(bad, "pw").validate().unwrap_err(),
            vec![FormError::UsernameCharacters],
            "{bad}"
        );
    }
}

#[test]
fn test_login_password_is_not_trimmed_or_checked() {
    assert!(login("alice", " ").validate().is_ok());
    assert_eq!(
        login("alice", "").validate().unwrap_err(),
        vec![FormError::PasswordRequired]
    );
}

#[test]
fn test_change_form_rules() {
    assert!(change("old", "new", "new").validate().is_ok());
    assert_eq!(
        change("old", "new", "other").validate().unwrap_err(),
        vec![FormError::PasswordsMustMatch]
    );
    assert_eq!(
        change("", "", "").validate().unwrap_err(),
        vec![
            FormError::CurrentPasswordRequired,
            FormError::NewPasswordRequired,
            FormError::ConfirmationRequired,
        ]
    );
}

#[test]
fn test_debug_output_hides_passwords() {
    let printed = format!("{:?} {:?}", login("alice", "hunter2"), change("a1", "b2", "b2"));
    assert!(printed.contains("alice"));
    assert!(!printed.contains("hunter2"));
    assert!(!printed.contains("b2"));
}
