use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Gated Router Module
///
/// Routes whose permission depends on *who* is calling. No layer guards them:
/// each handler receives the request's `Actor` and calls the Authorization Gate
/// before reading or mutating anything, so anonymous callers, authors and
/// administrators get distinct outcomes (401, 403, success).
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /post/{id}
        // Comment on a post. Any authenticated actor.
        .route("/post/{id}", post(handlers::add_comment))
        // POST /new-post
        // Administrators only.
        .route("/new-post", post(handlers::create_post))
        // GET/POST /edit-post/{id}
        // Prefill and submit an edit. Administrators only, ownership not checked.
        .route(
            "/edit-post/{id}",
            get(handlers::get_edit_post).post(handlers::edit_post),
        )
        // GET /delete/{id}
        // Administrators only, same check as editing.
        .route("/delete/{id}", get(handlers::delete_post))
        // PUT /admin/users/{id}/role
        // Promote or demote an account.
        .route("/admin/users/{id}/role", put(handlers::update_user_role))
}
