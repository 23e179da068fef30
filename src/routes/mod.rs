use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod enrich;
pub mod health;
pub mod metrics;
pub mod owners;

/// Large enough for a full 10 000-record batch.
const BODY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

/// API routes without the metrics endpoint.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/enrich", post(enrich::submit_enrichment))
        .route("/api/v1/enrich/{job_id}", get(enrich::get_job_status))
        .route("/api/v1/enrich/{job_id}/results", get(enrich::get_job_results))
        .route("/api/v1/enrich/{job_id}/poll", post(enrich::poll_job_now))
        .route("/api/v1/owners/{owner_id}/jobs", get(owners::list_jobs))
        .route("/api/v1/owners/{owner_id}/credits", get(owners::get_credits))
        .route(
            "/api/v1/owners/{owner_id}/credits/replenish",
            post(owners::replenish_credits),
        )
        .route("/api/v1/owners/{owner_id}/stats", get(owners::get_usage_stats))
        .route("/api/v1/owners/{owner_id}/account", post(owners::open_account))
        .with_state(state)
}

/// Full application: API routes, `/metrics` and the HTTP middleware stack.
pub fn app(state: AppState, prometheus: Arc<PrometheusHandle>) -> Router {
    api_router(state)
        .route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(prometheus),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
}
