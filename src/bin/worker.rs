use contact_enrich::{
    config::AppConfig,
    db::{self, PgCreditLedger, PgJobStore},
    routes,
    services::{provider::BetterContactClient, reconciler::Reconciler},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting enrichment reconciliation worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let metrics_addr: SocketAddr = config
        .worker_metrics_addr
        .parse()
        .expect("Invalid WORKER_METRICS_ADDR");
    routes::metrics::install_exporter(metrics_addr).expect("Failed to start Prometheus exporter");
    tracing::info!(addr = %metrics_addr, "Serving worker metrics");

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let provider = BetterContactClient::new(&config.provider_settings())
        .expect("Failed to initialize provider client");

    let settings = config.reconciler_settings();
    tracing::info!(
        poll_interval_secs = settings.poll_interval.as_secs(),
        batch_size = settings.batch_size,
        concurrency = settings.concurrency,
        "Worker ready, starting reconciliation loop"
    );

    let reconciler = Reconciler::new(
        Arc::new(provider),
        Arc::new(PgJobStore::new(db_pool.clone())),
        Arc::new(PgCreditLedger::new(db_pool)),
        settings,
    );

    reconciler
        .run_until(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;

    tracing::info!("Worker stopped");
}
