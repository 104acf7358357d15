// ============================
// crates/portal-lib/src/router.rs
// ============================
//! Route table.
use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::handlers::{auth, health, password};
use crate::middleware::require_login;
use crate::SharedState;

/// Create the portal router
pub fn create_router(state: SharedState) -> Router {
    let protected = Router::new()
        .route(
            "/change-password",
            get(password::change_password_page).post(password::change_password),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_login));

    Router::new()
        .route("/", get(auth::index))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/healthz", get(health::healthz))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
