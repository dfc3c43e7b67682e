// Main entry point for the run orchestration server

use std::sync::Arc;

use anyhow::{Context, Result};
use runs_core::domains::actors::ActorCatalog;
use runs_core::domains::auth::JwtService;
use runs_core::domains::runs::store::{MemoryRunStore, PostgresRunStore, RunStore};
use runs_core::domains::runs::RunController;
use runs_core::kernel::{EventBus, ReconcilerPool, ScraperServiceAdapter, ServerDeps};
use runs_core::server::{build_app, AppState};
use runs_core::Config;
use scraper_client::ScraperClient;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,runs_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting run orchestration server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let run_store: Arc<dyn RunStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connected");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations complete");

            Arc::new(PostgresRunStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, runs are kept in memory only");
            Arc::new(MemoryRunStore::new())
        }
    };

    let events = EventBus::new();
    let scraper = Arc::new(ScraperClient::new(config.scraper_service_url.clone()));
    tracing::info!(url = %scraper.base_url(), "Using scraping worker");

    let deps = ServerDeps::new(
        run_store,
        Arc::new(ScraperServiceAdapter::new(scraper)),
        Arc::new(ActorCatalog::builtin()),
        Arc::new(events.clone()),
        config.reconciler_config(),
    );
    let controller = RunController::new(
        deps,
        ReconcilerPool::new(config.max_concurrent_reconcilers),
    );

    // Pick up runs a previous process left queued or running
    let resumed = controller
        .resume_reconcilers()
        .await
        .context("Failed to resume reconcilers")?;
    tracing::info!(resumed, "Reconcilers resumed");

    let jwt_service = Arc::new(JwtService::new(&config.jwt_secret, config.jwt_issuer.clone()));
    let state = AppState::new(
        controller.clone(),
        events,
        jwt_service,
        config.worker_token.clone(),
    );
    let app = build_app(state, &config.allowed_origins);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    controller.reconcilers().shutdown();
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // Without a signal handler, keep serving until the process is killed
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
