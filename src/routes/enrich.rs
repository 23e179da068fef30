use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::error::EnrichError;
use crate::models::api::{JobStatusResponse, ResultsResponse, SubmitRequest, SubmitResponse};
use crate::services::reconciler::PollOutcome;
use crate::services::submission::Submission;

/// POST /api/v1/enrich: Submit a batch of contacts for enrichment.
pub async fn submit_enrichment(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), EnrichError> {
    let submission = Submission::try_from(request)?;
    let submitted = state.submission.submit(submission).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: submitted.job.job_id,
            status: submitted.job.status,
            record_count: submitted.job.record_count,
            worst_case_credits: submitted.worst_case_credits,
            message: "Batch submitted for enrichment".to_string(),
        }),
    ))
}

/// GET /api/v1/enrich/{job_id}: Check enrichment job status.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, EnrichError> {
    Ok(Json(state.queries.job_status(&job_id).await?))
}

/// GET /api/v1/enrich/{job_id}/results: Enriched contacts of a terminated job.
pub async fn get_job_results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ResultsResponse>, EnrichError> {
    Ok(Json(state.queries.results(&job_id).await?))
}

/// POST /api/v1/enrich/{job_id}/poll: Poll the provider now instead of
/// waiting for the worker.
pub async fn poll_job_now(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, EnrichError> {
    let outcome = state.reconciler.poll_now(&job_id).await?;
    let status = state.queries.job_status(&job_id).await?;

    let outcome = match outcome {
        PollOutcome::InFlight => "in_flight",
        PollOutcome::Retrying { .. } => "provider_unavailable",
        PollOutcome::Failed => "failed",
        PollOutcome::Terminated { .. } => "terminated",
        PollOutcome::AlreadyTerminal => "already_terminal",
    };

    Ok(Json(json!({ "outcome": outcome, "job": status })))
}
