use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;

/// Install the Prometheus recorder for the API process, rendered by `/metrics`.
pub fn install_recorder() -> Result<Arc<PrometheusHandle>, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(Arc::new(handle))
}

/// Install the recorder with its own scrape listener on `addr`. Used by the
/// worker, which records the reconciliation metrics but serves no API.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!(
        "enrichment_jobs_submitted_total",
        "Enrichment jobs accepted by the provider and recorded"
    );
    metrics::describe_counter!(
        "enrichment_jobs_terminated_total",
        "Enrichment jobs whose results were stored"
    );
    metrics::describe_counter!(
        "enrichment_jobs_failed_total",
        "Enrichment jobs the provider reported as failed"
    );
    metrics::describe_counter!(
        "enrichment_credits_charged_total",
        "Credits charged to owner ledgers"
    );
    metrics::describe_counter!(
        "enrichment_provider_errors_total",
        "Transient errors while polling the provider"
    );
    metrics::describe_counter!(
        "enrichment_charge_failures_total",
        "Failed ledger charge attempts"
    );
    metrics::describe_histogram!(
        "enrichment_poll_seconds",
        "Latency of provider status requests"
    );
}

/// Prometheus metrics scrape endpoint.
/// Returns metrics in Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
