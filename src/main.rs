use anyhow::Context;
use collablearn::{
    AppState,
    config::{AppConfig, AuthProvider, Env},
    create_router, credentials,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Boots the service: configuration, logging, database (with migrations), the
/// credential provider and finally the HTTP server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();
    let config = AppConfig::load().context("failed to load configuration")?;

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "collablearn=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for log aggregation.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .context("failed to connect to Postgres, check DATABASE_URL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to apply database migrations")?;
    tracing::info!("Database connected and migrations applied");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 4. Credentials
    let credentials = credentials::from_config(&config);
    match &config.auth_provider {
        AuthProvider::Local => tracing::info!("Using local argon2 credentials"),
        AuthProvider::Supabase { url, .. } => {
            tracing::info!(%url, "Delegating credentials to Supabase auth")
        }
    }

    // 5. Router and server
    let addr = format!("0.0.0.0:{}", config.port);
    let app = create_router(AppState {
        repo,
        credentials,
        config,
    });

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Listening on {addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{addr}/swagger-ui");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
