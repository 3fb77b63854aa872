use quill_blog::{
    AppState, RelayMailClient,
    config::{AppConfig, Env},
    create_router,
    mail::MailState,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const BIND_ADDR: &str = "0.0.0.0:3000";

/// Installs the global subscriber: human-readable locally, one JSON object per
/// line in production. `RUST_LOG` overrides the default filter.
fn init_tracing(env: &Env) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "quill_blog=debug,tower_http=info,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    match env {
        Env::Local => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
        Env::Production => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Startup runs config, logging, database, mail and then the HTTP server, and
/// aborts on the first failure.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = AppConfig::load();
    init_tracing(&config.env);

    tracing::info!(env = ?config.env, site = %config.site_name, "starting blog backend");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations.");

    let repo: RepositoryState = Arc::new(PostgresRepository::new(pool));
    let mail: MailState = Arc::new(
        RelayMailClient::new(&config).expect("FATAL: Failed to build the mail relay client."),
    );

    let app = create_router(AppState { repo, mail, config });

    let listener = TcpListener::bind(BIND_ADDR)
        .await
        .expect("FATAL: Failed to bind the listen address");

    tracing::info!("listening on {BIND_ADDR}, API docs at /swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}
