//! Collaborator interfaces used by the submission gateway and the reconciler.
//!
//! Postgres and HTTP implementations live in `db` and `services::provider`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::contact::{OutboundRecord, ResultRecord, ResultRow};
use crate::models::credits::{ChargeOutcome, CreditAccount, CreditCheck};
use crate::models::job::{Completion, EnrichmentJob, JobCounts, NewJob};

/// Durable record of submitted jobs and their results.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: NewJob) -> Result<EnrichmentJob, StoreError>;

    async fn get_job(&self, job_id: &str) -> Result<Option<EnrichmentJob>, StoreError>;

    /// Newest first.
    async fn list_jobs(&self, owner_id: &str, limit: i64)
        -> Result<Vec<EnrichmentJob>, StoreError>;

    async fn count_jobs(&self, owner_id: &str) -> Result<JobCounts, StoreError>;

    /// Non-terminal jobs whose next poll is due, oldest first.
    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EnrichmentJob>, StoreError>;

    /// Move a pending job to processing. Returns `false` if it was not pending.
    async fn mark_processing(&self, job_id: &str) -> Result<bool, StoreError>;

    /// Clear the transient failure counter and set the next poll time.
    async fn schedule_poll(
        &self,
        job_id: &str,
        next_poll_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Record a transient polling failure. Returns the consecutive failure count.
    async fn record_poll_failure(
        &self,
        job_id: &str,
        error: &str,
        next_poll_at: DateTime<Utc>,
    ) -> Result<i32, StoreError>;

    /// Move a non-terminal job to failed. Returns `false` if it was already terminal.
    async fn mark_failed(&self, job_id: &str, reason: &str) -> Result<bool, StoreError>;

    /// Persist every result row and move the job to terminated, atomically.
    /// A job that is already terminal is left untouched.
    async fn complete_with_results(
        &self,
        job_id: &str,
        results: &[ResultRecord],
        credits_used: i64,
    ) -> Result<Completion, StoreError>;

    async fn get_results(&self, job_id: &str) -> Result<Vec<ResultRecord>, StoreError>;

    /// Terminated jobs whose charge is still pending.
    async fn unsettled_charges(&self, limit: i64) -> Result<Vec<EnrichmentJob>, StoreError>;

    async fn mark_charge_applied(&self, job_id: &str) -> Result<(), StoreError>;

    /// Record a failed charge attempt, flagging it for manual reconciliation
    /// when `flag` is set. Returns the attempt count.
    async fn record_charge_failure(
        &self,
        job_id: &str,
        error: &str,
        flag: bool,
    ) -> Result<i32, StoreError>;
}

/// Per-owner credit balance.
///
/// `charge` must be an atomic increment keyed by job id; callers never
/// compute balances themselves.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn account(&self, owner_id: &str) -> Result<Option<CreditAccount>, LedgerError>;

    /// Create the account with a starting allotment, or return the existing one.
    async fn open_account(
        &self,
        owner_id: &str,
        total_credits: i64,
    ) -> Result<CreditAccount, LedgerError>;

    /// Advisory, read-only. Nothing is reserved.
    async fn check_available(
        &self,
        owner_id: &str,
        amount: i64,
    ) -> Result<CreditCheck, LedgerError> {
        let account = self
            .account(owner_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(owner_id.to_string()))?;
        let remaining = account.remaining();
        Ok(CreditCheck {
            ok: remaining >= amount,
            remaining,
            required: amount,
        })
    }

    /// Add `amount` to `used_credits` unless a charge for `job_id` was
    /// already recorded.
    async fn charge(
        &self,
        owner_id: &str,
        job_id: &str,
        amount: i64,
    ) -> Result<ChargeOutcome, LedgerError>;

    /// Billing-cycle reset: new total, nothing used.
    async fn replenish(
        &self,
        owner_id: &str,
        total_credits: i64,
    ) -> Result<CreditAccount, LedgerError>;
}

/// Asynchronous batch enrichment service.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Submit a batch. Returns the provider-assigned job id.
    async fn create_job(&self, batch: &EnrichmentBatch) -> Result<String, ProviderError>;

    /// Side-effect free; safe to call repeatedly and concurrently.
    async fn fetch_status(&self, job_id: &str) -> Result<ProviderStatus, ProviderError>;
}

/// Request body for a batch submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentBatch {
    pub data: Vec<OutboundRecord>,
    pub enrich_email_address: bool,
    pub enrich_phone_number: bool,
}

/// What the provider reports for a job.
#[derive(Debug, Clone)]
pub enum ProviderStatus {
    Pending,
    Processing,
    Terminated(Vec<ResultRow>),
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job already exists: {0}")]
    Duplicate(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Invalid stored value: {0}")]
    Corrupt(String),

    #[error("Job store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Credit account not found for owner {0}")]
    AccountNotFound(String),

    #[error("Invalid credit amount: {0}")]
    InvalidAmount(i64),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Transport(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Provider rejected the batch: {0}")]
    Rejected(String),

    #[error("Failed to decode provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Transport problems, throttling and server errors may clear up on
    /// their own; everything else will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::Timeout | ProviderError::Decode(_) => {
                true
            }
            ProviderError::Http { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            ProviderError::Rejected(_) => false,
        }
    }
}
