use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::ports::{LedgerError, ProviderError, StoreError};

/// Errors surfaced by the enrichment operations.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("Invalid submission: {0}")]
    Validation(String),

    #[error("Insufficient credits: {required} required, {remaining} remaining")]
    InsufficientCredits { required: i64, remaining: i64 },

    #[error("Enrichment provider temporarily unavailable: {0}")]
    ProviderTransient(ProviderError),

    #[error("Enrichment provider failure: {0}")]
    ProviderTerminal(ProviderError),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Credit account not found for owner {0}")]
    AccountNotFound(String),
}

impl EnrichError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EnrichError::Validation(_) => StatusCode::BAD_REQUEST,
            EnrichError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            EnrichError::ProviderTransient(_) | EnrichError::ProviderTerminal(_) => {
                StatusCode::BAD_GATEWAY
            }
            EnrichError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EnrichError::JobNotFound(_) | EnrichError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl From<ProviderError> for EnrichError {
    fn from(err: ProviderError) -> Self {
        if err.is_retryable() {
            EnrichError::ProviderTransient(err)
        } else {
            EnrichError::ProviderTerminal(err)
        }
    }
}

impl From<StoreError> for EnrichError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(job_id) => EnrichError::JobNotFound(job_id),
            other => EnrichError::Persistence(other.to_string()),
        }
    }
}

impl From<LedgerError> for EnrichError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound(owner_id) => EnrichError::AccountNotFound(owner_id),
            LedgerError::InvalidAmount(_) => EnrichError::Validation(err.to_string()),
            other => EnrichError::Persistence(other.to_string()),
        }
    }
}

impl IntoResponse for EnrichError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = match &self {
            EnrichError::InsufficientCredits { required, remaining } => json!({
                "error": "Insufficient credits",
                "details": {
                    "required_credits": required,
                    "remaining_credits": remaining,
                    "message": format!(
                        "You need {} credits but only have {} remaining.",
                        required, remaining
                    ),
                }
            }),
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
