// ============================
// crates/portal-lib/src/handlers/auth.rs
// ============================
//! Login, logout and the landing redirect.
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use metrics::counter;
use serde::Deserialize;

use crate::auth::session::session_cookie;
use crate::auth::{
    AuthOutcome, Flash, FlashLevel, RejectReason, SessionManager, TWO_FACTOR_MESSAGE,
};
use crate::forms::LoginForm;
use crate::metrics::{LOGIN_ATTEMPT, LOGIN_THROTTLED};
use crate::middleware::ClientIp;
use crate::{views, SharedState};

pub const LOGIN_FAILED: &str = "Invalid username or password.";
pub const LOGIN_THROTTLED_MESSAGE: &str = "Too many login attempts, please try again later.";
pub const LOGIN_SUCCEEDED: &str = "Login successful!";

/// `?notice=` on the login page
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub notice: Option<String>,
}

async fn has_session(state: &SharedState, headers: &HeaderMap) -> bool {
    match session_cookie(headers) {
        Some(cookie) => state.sessions.get(&cookie).await.is_some(),
        None => false,
    }
}

/// `GET /`
pub async fn index(State(state): State<SharedState>, headers: HeaderMap) -> Redirect {
    if has_session(&state, &headers).await {
        Redirect::to("/change-password")
    } else {
        Redirect::to("/login")
    }
}

/// `GET /login`
pub async fn login_page(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Response {
    if has_session(&state, &headers).await {
        return Redirect::to("/change-password").into_response();
    }

    let flashes: Vec<Flash> = match query.notice.as_deref() {
        Some("login-required") => vec![Flash::new(FlashLevel::Info, "Please log in to access this page.")],
        Some("logged-out") => vec![Flash::new(FlashLevel::Info, "You have been logged out.")],
        _ => Vec::new(),
    };
    Html(views::login_page(&flashes, &[], "")).into_response()
}

/// `POST /login`
pub async fn login(
    State(state): State<SharedState>,
    ClientIp(ip): ClientIp,
    Form(form): Form<LoginForm>,
) -> Response {
    if !state.login_limiter.check_rate_limit(ip) {
        tracing::warn!(%ip, "login refused: address is locked out");
        counter!(LOGIN_THROTTLED).increment(1);
        let page = views::login_page(&[], &[LOGIN_THROTTLED_MESSAGE.to_string()], &form.username);
        return (StatusCode::TOO_MANY_REQUESTS, Html(page)).into_response();
    }

    if let Err(errors) = form.validate() {
        let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
        let page = views::login_page(&[], &errors, &form.username);
        return (StatusCode::BAD_REQUEST, Html(page)).into_response();
    }

    counter!(LOGIN_ATTEMPT).increment(1);
    let credential = form.into_credential();

    match state.auth.authenticate(&credential).await {
        AuthOutcome::Authenticated(user) => {
            state.login_limiter.record_success(ip);
            let cookie = state.sessions.create(user).await;
            state
                .sessions
                .flash(&cookie, Flash::new(FlashLevel::Success, LOGIN_SUCCEEDED))
                .await;
            let set_cookie = state.sessions.cookie(&cookie, state.settings.session.cookie_secure);
            ([(header::SET_COOKIE, set_cookie)], Redirect::to("/change-password")).into_response()
        },
        // The password was right, so this is not a failed attempt
        AuthOutcome::Rejected(RejectReason::TwoFactorRequired) => {
            let page = views::login_page(&[], &[TWO_FACTOR_MESSAGE.to_string()], credential.username());
            (StatusCode::FORBIDDEN, Html(page)).into_response()
        },
        AuthOutcome::Rejected(_) => {
            state.login_limiter.record_failed_attempt(ip);
            let page = views::login_page(&[], &[LOGIN_FAILED.to_string()], credential.username());
            (StatusCode::UNAUTHORIZED, Html(page)).into_response()
        },
    }
}

/// `GET /logout`
pub async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if let Some(cookie) = session_cookie(&headers) {
        if let Some(session) = state.sessions.get(&cookie).await {
            tracing::info!(username = session.username(), "logged out");
        }
        state.sessions.destroy(&cookie).await;
    }
    let removal = SessionManager::removal_cookie(state.settings.session.cookie_secure);
    ([(header::SET_COOKIE, removal)], Redirect::to("/login?notice=logged-out")).into_response()
}
