use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::error::EnrichError;
use crate::models::api::{CreditsResponse, JobStatusResponse, ListJobsParams, ReplenishRequest};
use crate::models::credits::UsageStats;

/// GET /api/v1/owners/{owner_id}/jobs: Owner's jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<Vec<JobStatusResponse>>, EnrichError> {
    Ok(Json(state.queries.list_jobs(&owner_id, params.limit).await?))
}

/// GET /api/v1/owners/{owner_id}/credits
pub async fn get_credits(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<Json<CreditsResponse>, EnrichError> {
    Ok(Json(state.queries.remaining_credits(&owner_id).await?))
}

/// GET /api/v1/owners/{owner_id}/stats
pub async fn get_usage_stats(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<Json<UsageStats>, EnrichError> {
    Ok(Json(state.queries.usage_stats(&owner_id).await?))
}

/// POST /api/v1/owners/{owner_id}/account: Open a trial account.
pub async fn open_account(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<(StatusCode, Json<CreditsResponse>), EnrichError> {
    let account = state.queries.open_account(&owner_id).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// POST /api/v1/owners/{owner_id}/credits/replenish
pub async fn replenish_credits(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(request): Json<ReplenishRequest>,
) -> Result<Json<CreditsResponse>, EnrichError> {
    request
        .validate()
        .map_err(|report| EnrichError::Validation(report.to_string()))?;
    Ok(Json(
        state.queries.replenish(&owner_id, request.total_credits).await?,
    ))
}
