use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes that require a resolved session. The whole router sits behind the
/// `auth_middleware` layer, which rejects anonymous requests with 401.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // The account bound to the current session.
        .route("/me", get(handlers::get_me))
}
