use std::sync::Arc;

use crate::error::EnrichError;
use crate::models::api::{CreditsResponse, JobStatusResponse, ResultsResponse};
use crate::models::credits::{CreditAccount, UsageStats};
use crate::models::job::JobStatus;
use crate::ports::{CreditLedger, JobStore};

const MAX_LIST_LIMIT: i64 = 500;

/// Read-side operations plus account management for the API layer.
pub struct EnrichmentQueries {
    jobs: Arc<dyn JobStore>,
    ledger: Arc<dyn CreditLedger>,
    stall_threshold: i32,
    trial_credits: i64,
}

impl EnrichmentQueries {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        ledger: Arc<dyn CreditLedger>,
        stall_threshold: i32,
        trial_credits: i64,
    ) -> Self {
        Self {
            jobs,
            ledger,
            stall_threshold,
            trial_credits,
        }
    }

    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, EnrichError> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| EnrichError::JobNotFound(job_id.to_string()))?;

        Ok(JobStatusResponse::from_job(&job, self.stall_threshold))
    }

    /// Results are only visible once the job has terminated.
    pub async fn results(&self, job_id: &str) -> Result<ResultsResponse, EnrichError> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| EnrichError::JobNotFound(job_id.to_string()))?;

        let results = if job.status == JobStatus::Terminated {
            self.jobs.get_results(job_id).await?
        } else {
            Vec::new()
        };

        Ok(ResultsResponse {
            job_id: job.job_id,
            status: job.status,
            results,
        })
    }

    pub async fn remaining_credits(&self, owner_id: &str) -> Result<CreditsResponse, EnrichError> {
        let account = self.require_account(owner_id).await?;
        Ok(CreditsResponse::from(&account))
    }

    pub async fn list_jobs(
        &self,
        owner_id: &str,
        limit: i64,
    ) -> Result<Vec<JobStatusResponse>, EnrichError> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        let jobs = self.jobs.list_jobs(owner_id, limit).await?;
        Ok(jobs
            .iter()
            .map(|job| JobStatusResponse::from_job(job, self.stall_threshold))
            .collect())
    }

    pub async fn usage_stats(&self, owner_id: &str) -> Result<UsageStats, EnrichError> {
        let counts = self.jobs.count_jobs(owner_id).await?;
        let account = self.ledger.account(owner_id).await?;

        let mut stats = UsageStats {
            total_jobs: counts.total(),
            terminated_jobs: counts.terminated,
            in_flight_jobs: counts.pending + counts.processing,
            failed_jobs: counts.failed,
            ..Default::default()
        };
        if let Some(account) = account {
            stats.total_credits = account.total_credits;
            stats.used_credits = account.used_credits;
            stats.remaining_credits = account.remaining();
        }
        Ok(stats)
    }

    /// Opens an account with the trial allotment. Repeat calls return the
    /// existing account untouched.
    pub async fn open_account(&self, owner_id: &str) -> Result<CreditsResponse, EnrichError> {
        if owner_id.trim().is_empty() {
            return Err(EnrichError::Validation("owner_id must not be empty".into()));
        }
        let account = self.ledger.open_account(owner_id, self.trial_credits).await?;
        tracing::info!(
            owner_id = %owner_id,
            total_credits = account.total_credits,
            "Credit account opened"
        );
        Ok(CreditsResponse::from(&account))
    }

    /// Start of a new billing cycle.
    pub async fn replenish(
        &self,
        owner_id: &str,
        total_credits: i64,
    ) -> Result<CreditsResponse, EnrichError> {
        let account = self.ledger.replenish(owner_id, total_credits).await?;
        tracing::info!(owner_id = %owner_id, total_credits, "Credits replenished");
        Ok(CreditsResponse::from(&account))
    }

    async fn require_account(&self, owner_id: &str) -> Result<CreditAccount, EnrichError> {
        self.ledger
            .account(owner_id)
            .await?
            .ok_or_else(|| EnrichError::AccountNotFound(owner_id.to_string()))
    }
}
