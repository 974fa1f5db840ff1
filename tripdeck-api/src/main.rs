use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripdeck_api::{app, state::{AppState, AuthConfig}};
use tripdeck_store::{app_config::Config, DbClient, PgBookingRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripdeck_api=debug,tripdeck_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!(
        "Starting TripDeck API on port {} ({})",
        config.server.port,
        config.server.environment
    );

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let repo = Arc::new(PgBookingRepository::new(db.pool.clone()));
    let app_state = AppState::new(
        repo,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            leeway_seconds: config.auth.jwt_leeway_seconds,
        },
        config.server.is_development(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app(app_state)).await?;

    Ok(())
}
