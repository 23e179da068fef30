use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use contact_enrich::{
    app_state::AppState,
    config::AppConfig,
    db::{self, PgCreditLedger, PgJobStore},
    routes,
    services::provider::BetterContactClient,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing contact-enrich server");

    let prometheus_handle =
        routes::metrics::install_recorder().expect("Failed to install Prometheus metrics recorder");

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Initializing enrichment provider client");
    let provider = BetterContactClient::new(&config.provider_settings())
        .expect("Failed to initialize provider client");

    let state = AppState::new(
        Some(db_pool.clone()),
        Arc::new(provider),
        Arc::new(PgJobStore::new(db_pool.clone())),
        Arc::new(PgCreditLedger::new(db_pool)),
        config.reconciler_settings(),
        config.trial_credits,
    );

    let app = routes::app(state, prometheus_handle);

    tracing::info!("Starting contact-enrich on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");
}
