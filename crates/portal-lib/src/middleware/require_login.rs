// ============================
// crates/portal-lib/src/middleware/require_login.rs
// ============================
//! Guard for pages that need a logged-in user.
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::auth::session::session_cookie;
use crate::auth::Session;
use crate::SharedState;

/// Where anonymous visitors of protected pages are sent
pub const LOGIN_REQUIRED_REDIRECT: &str = "/login?notice=login-required";

/// The live session of the current request, inserted by [`require_login`]
#[derive(Clone, Debug)]
pub struct CurrentSession {
    /// Signed cookie value identifying the session
    pub cookie: String,
    pub session: Session,
}

impl CurrentSession {
    pub fn username(&self) -> &str {
        self.session.username()
    }
}

/// Redirect to the login page unless the request carries a live session
pub async fn require_login(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    let current = match session_cookie(request.headers()) {
        Some(cookie) => state
            .sessions
            .get(&cookie)
            .await
            .map(|session| CurrentSession { cookie, session }),
        None => None,
    };

    match current {
        Some(current) => {
            request.extensions_mut().insert(current);
            next.run(request).await
        },
        None => {
            tracing::debug!(path = %request.uri().path(), "no session, redirecting to login");
            Redirect::to(LOGIN_REQUIRED_REDIRECT).into_response()
        },
    }
}
