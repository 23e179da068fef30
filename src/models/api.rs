use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::contact::{ContactRecord, ResultRecord};
use crate::models::credits::CreditAccount;
use crate::models::job::{ChargeStatus, EnrichmentJob, EnrichmentMode, JobStatus, RequestType};

/// Request to submit a batch of contacts for enrichment.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitRequest {
    #[garde(length(min = 1, max = 128))]
    pub owner_id: String,

    /// Explicit mode; takes precedence over the flag pair.
    #[garde(skip)]
    #[serde(default)]
    pub mode: Option<EnrichmentMode>,

    #[garde(skip)]
    #[serde(default)]
    pub enrich_email: Option<bool>,

    #[garde(skip)]
    #[serde(default)]
    pub enrich_phone: Option<bool>,

    #[garde(skip)]
    #[serde(default)]
    pub request_type: RequestType,

    #[garde(length(min = 1, max = 200))]
    #[serde(default)]
    pub list_name: Option<String>,

    #[garde(length(max = 255))]
    #[serde(default)]
    pub file_name: Option<String>,

    #[garde(length(max = 255))]
    #[serde(default)]
    pub sheet_name: Option<String>,

    /// At most 10 000 contacts per batch.
    #[garde(length(min = 1, max = 10000), dive)]
    pub records: Vec<ContactRecord>,
}

impl SubmitRequest {
    pub fn resolved_mode(&self) -> Option<EnrichmentMode> {
        self.mode.or_else(|| {
            EnrichmentMode::from_flags(
                self.enrich_email.unwrap_or(false),
                self.enrich_phone.unwrap_or(false),
            )
        })
    }
}

/// Response after a batch was accepted by the provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub record_count: i32,
    /// Upper bound on what this job can cost; nothing is reserved.
    pub worst_case_credits: i64,
    pub message: String,
}

/// Response for querying job status.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub mode: EnrichmentMode,
    pub request_type: RequestType,
    pub list_name: String,
    pub record_count: i32,
    pub credits_used: Option<i64>,
    pub charge_status: ChargeStatus,
    /// The provider has not answered for a while; the job is still pending.
    pub stalled: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobStatusResponse {
    pub fn from_job(job: &EnrichmentJob, stall_threshold: i32) -> Self {
        Self {
            job_id: job.job_id.clone(),
            owner_id: job.owner_id.clone(),
            status: job.status,
            mode: job.mode,
            request_type: job.request_type,
            list_name: job.list_name.clone(),
            record_count: job.record_count,
            credits_used: job.credits_used,
            charge_status: job.charge_status,
            stalled: !job.status.is_terminal() && job.poll_failures >= stall_threshold,
            last_error: job.last_error.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub results: Vec<ResultRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreditsResponse {
    pub owner_id: String,
    pub total_credits: i64,
    pub used_credits: i64,
    pub remaining_credits: i64,
}

impl From<&CreditAccount> for CreditsResponse {
    fn from(account: &CreditAccount) -> Self {
        Self {
            owner_id: account.owner_id.clone(),
            total_credits: account.total_credits,
            used_credits: account.used_credits,
            remaining_credits: account.remaining(),
        }
    }
}

/// Billing-cycle reset for an owner's credit account.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReplenishRequest {
    #[garde(range(min = 0))]
    pub total_credits: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

fn default_list_limit() -> i64 {
    50
}
