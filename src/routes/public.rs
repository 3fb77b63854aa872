use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: browsing, account creation, login and
/// logout, and the about/contact pages.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /?page_index=N
        // Paginated listing, newest posts first.
        .route("/", get(handlers::list_posts))
        // POST /register
        .route("/register", post(handlers::register_user))
        // POST /login
        // Returns a Bearer session token.
        .route("/login", post(handlers::login))
        // GET /logout
        // Ends the presented session (no-op without one) and redirects to the listing.
        .route("/logout", get(handlers::logout))
        // GET /post/{id}
        // Post detail with comments. POST on the same path lives in the gated router.
        .route("/post/{id}", get(handlers::show_post))
        .route("/about", get(handlers::about))
        // GET/POST /contact
        // The contact form is also submitted to /form-entry.
        .route(
            "/contact",
            get(handlers::contact_info).post(handlers::send_contact),
        )
        .route("/form-entry", post(handlers::send_contact))
}
