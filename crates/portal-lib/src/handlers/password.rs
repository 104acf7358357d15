// ============================
// crates/portal-lib/src/handlers/password.rs
// ============================
//! The password change page.
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use metrics::counter;

use crate::auth::{ChangeError, Flash, FlashLevel};
use crate::error::ApiError;
use crate::forms::PasswordChangeForm;
use crate::handlers::auth::LOGIN_THROTTLED_MESSAGE;
use crate::metrics::LOGIN_THROTTLED;
use crate::middleware::{ClientIp, CurrentSession};
use crate::{views, SharedState};

pub const PASSWORD_CHANGED_MESSAGE: &str = "Password changed successfully!";

/// `GET /change-password`
pub async fn change_password_page(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
) -> Html<String> {
    let flashes = state.sessions.take_flashes(&current.cookie).await;
    Html(views::change_password_page(current.username(), &flashes, &[]))
}

/// `POST /change-password`
///
/// The current-password check counts against the same per-address limit
/// as the login form.
pub async fn change_password(
    State(state): State<SharedState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    Form(form): Form<PasswordChangeForm>,
) -> Response {
    if !state.login_limiter.check_rate_limit(ip) {
        tracing::warn!(%ip, username = current.username(), "password change refused: address is locked out");
        counter!(LOGIN_THROTTLED).increment(1);
        let page = views::change_password_page(
            current.username(),
            &[],
            &[LOGIN_THROTTLED_MESSAGE.to_string()],
        );
        return (StatusCode::TOO_MANY_REQUESTS, Html(page)).into_response();
    }

    if let Err(errors) = form.validate() {
        let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
        let page = views::change_password_page(current.username(), &[], &errors);
        return (StatusCode::BAD_REQUEST, Html(page)).into_response();
    }

    let result = state
        .auth
        .change_password(&current.session.user, &form.current_password, &form.new_password)
        .await;

    match result {
        Ok(()) => {
            state.login_limiter.record_success(ip);
            state
                .sessions
                .flash(&current.cookie, Flash::new(FlashLevel::Success, PASSWORD_CHANGED_MESSAGE))
                .await;
            Redirect::to("/change-password").into_response()
        },
        Err(e) => {
            if e == ChangeError::CurrentPasswordIncorrect {
                state.login_limiter.record_failed_attempt(ip);
            }
            let status = match &e {
                ChangeError::CurrentPasswordIncorrect | ChangeError::Api(ApiError::Validation(_)) => {
                    StatusCode::BAD_REQUEST
                },
                ChangeError::TwoFactorRequired => StatusCode::FORBIDDEN,
                ChangeError::Api(ApiError::Connectivity(_)) => StatusCode::SERVICE_UNAVAILABLE,
                ChangeError::Api(_) => StatusCode::BAD_GATEWAY,
            };
            let page = views::change_password_page(current.username(), &[], &[e.user_message()]);
            (status, Html(page)).into_response()
        },
    }
}
