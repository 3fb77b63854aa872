use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Identity, sessions and authorization.
pub mod auth;
pub mod gate;
pub mod identity;

// Persistence and listing.
pub mod memory;
pub mod pagination;
pub mod repository;

// HTTP surface and shared plumbing.
pub mod config;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod models;

// Module for routing segregation (Public, Authenticated, Gated).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use mail::{MailState, MockMailService, RelayMailClient};
pub use memory::MemoryRepository;
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and schema into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_posts, handlers::show_post, handlers::register_user, handlers::login,
        handlers::logout, handlers::get_me, handlers::add_comment, handlers::create_post,
        handlers::get_edit_post, handlers::edit_post, handlers::delete_post,
        handlers::update_user_role, handlers::about, handlers::contact_info,
        handlers::send_contact
    ),
    components(
        schemas(
            models::User, models::Role, models::Post, models::Comment, models::PostFields,
            models::RegisterRequest, models::LoginRequest, models::CreateCommentRequest,
            models::UpdateRoleRequest, models::ContactRequest, models::SessionResponse,
            models::PostPage, models::PostDetail, models::SiteInfo,
        )
    ),
    tags(
        (name = "quill-blog", description = "Blog posts, comments and accounts")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container of shared services handed to every request.
#[derive(Clone)]
pub struct AppState {
    /// Content and identity persistence.
    pub repo: RepositoryState,
    /// Outbound mail for the contact form.
    pub mail: MailState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors pull only the component they need out of AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MailState {
    fn from_ref(app_state: &AppState) -> MailState {
        app_state.mail.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// Rejects anonymous requests to the session-only routes with 401; the work is
/// done by the `AuthUser` extractor.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Builds the full application: public, session-only and gated routers merged
/// under one state, wrapped in request-id, tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let session_only = authenticated::authenticated_routes()
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(session_only)
        // The gate runs inside each of these handlers.
        .merge(admin::admin_routes())
        .with_state(state);

    with_request_layers(app)
}

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Outermost middleware shared by every route.
///
/// Each request gets a UUID in `x-request-id` (echoed back to the client) and a
/// tracing span carrying it, so all log lines of one request correlate.
fn with_request_layers(app: Router) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let observability = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .layer(PropagateRequestIdLayer::new(request_id.clone()));

    // Browser clients send the bearer token from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([request_id]);

    app.layer(observability).layer(cors)
}

fn request_span(request: &axum::http::Request<axum::body::Body>) -> Span {
    let req_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        req_id,
    )
}
