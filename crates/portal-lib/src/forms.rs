// ============================
// crates/portal-lib/src/forms.rs
// ============================
//! Login and password-change form input.

use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use zeroize::Zeroize;

use crate::auth::Credential;

const MAX_USERNAME_LENGTH: usize = 64;

// No control characters and no surrounding whitespace
static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s\p{Cc}](?:[^\p{Cc}]*[^\s\p{Cc}])?$").unwrap());

/// Possible form errors; the display text is shown on the page
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("Username is required")]
    UsernameRequired,

    #[error("Username must be between 1 and 64 characters")]
    UsernameLength,

    #[error("Username contains invalid characters")]
    UsernameCharacters,

    #[error("Password is required")]
    PasswordRequired,

    #[error("Current password is required")]
    CurrentPasswordRequired,

    #[error("New password is required")]
    NewPasswordRequired,

    #[error("Please confirm your new password")]
    ConfirmationRequired,

    #[error("Passwords must match")]
    PasswordsMustMatch,
}

/// `POST /login` body
#[derive(Deserialize, Default)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), Vec<FormError>> {
        let mut errors = Vec::new();

        if self.username.is_empty() {
            errors.push(FormError::UsernameRequired);
        } else if self.username.chars().count() > MAX_USERNAME_LENGTH {
            errors.push(FormError::UsernameLength);
        } else if !USERNAME_REGEX.is_match(&self.username) {
            errors.push(FormError::UsernameCharacters);
        }

        if self.password.is_empty() {
            errors.push(FormError::PasswordRequired);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Hand the fields over to a [`Credential`], leaving the form empty
    pub fn into_credential(mut self) -> Credential {
        let username = std::mem::take(&mut self.username);
        let password = std::mem::take(&mut self.password);
        Credential::new(username, password)
    }
}

impl Drop for LoginForm {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginForm")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// `POST /change-password` body
#[derive(Deserialize, Default)]
pub struct PasswordChangeForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

impl PasswordChangeForm {
    pub fn validate(&self) -> Result<(), Vec<FormError>> {
        let mut errors = Vec::new();

        if self.current_password.is_empty() {
            errors.push(FormError::CurrentPasswordRequired);
        }
        if self.new_password.is_empty() {
            errors.push(FormError::NewPasswordRequired);
        }
        if self.confirm_password.is_empty() {
            errors.push(FormError::ConfirmationRequired);
        } else if self.confirm_password != self.new_password {
            errors.push(FormError::PasswordsMustMatch);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl fmt::Debug for PasswordChangeForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordChangeForm").finish_non_exhaustive()
    }
}

impl Drop for PasswordChangeForm {
    fn drop(&mut self) {
        self.current_password.zeroize();
        self.new_password.zeroize();
        self.confirm_password.zeroize();
    }
}
