use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Status of an enrichment job as tracked locally.
///
/// `Pending` and `Processing` are transient; `Terminated` and `Failed` are
/// absorbing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Terminated,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Terminated | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` keeps the status sequence a prefix
    /// of `pending, processing, {terminated|failed}`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Pending | JobStatus::Processing, JobStatus::Terminated) => true,
            (JobStatus::Pending | JobStatus::Processing, JobStatus::Failed) => true,
            _ => false,
        }
    }
}

/// Which contact fields the provider is asked to discover.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, IntoStaticStr, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnrichmentMode {
    Email,
    Phone,
    Both,
}

impl EnrichmentMode {
    /// Map the provider's flag pair onto a mode. Returns `None` when neither
    /// flag is set.
    pub fn from_flags(enrich_email: bool, enrich_phone: bool) -> Option<Self> {
        match (enrich_email, enrich_phone) {
            (true, true) => Some(EnrichmentMode::Both),
            (true, false) => Some(EnrichmentMode::Email),
            (false, true) => Some(EnrichmentMode::Phone),
            (false, false) => None,
        }
    }

    pub fn wants_email(&self) -> bool {
        matches!(self, EnrichmentMode::Email | EnrichmentMode::Both)
    }

    pub fn wants_phone(&self) -> bool {
        matches!(self, EnrichmentMode::Phone | EnrichmentMode::Both)
    }
}

/// How the batch reached us: a single contact form or a spreadsheet upload.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, IntoStaticStr, PartialEq, Eq, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestType {
    #[default]
    Individual,
    File,
}

/// Settlement state of the credit charge attached to a terminated job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, IntoStaticStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChargeStatus {
    /// Job not terminated yet, or terminated with nothing billable.
    NotRequired,
    /// Results are persisted, the ledger charge has not been confirmed.
    Pending,
    Applied,
    /// Retries exhausted; needs manual reconciliation.
    Flagged,
}

/// One submitted enrichment batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentJob {
    /// Provider-assigned identifier.
    pub job_id: String,
    pub owner_id: String,
    pub mode: EnrichmentMode,
    pub request_type: RequestType,
    pub list_name: String,
    pub record_count: i32,
    pub status: JobStatus,
    /// Exact payload sent to the provider.
    pub input_snapshot: serde_json::Value,
    pub credits_used: Option<i64>,
    pub charge_status: ChargeStatus,
    pub charge_attempts: i32,
    /// Consecutive transient polling failures.
    pub poll_failures: i32,
    pub next_poll_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Values needed to record a freshly accepted provider job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: String,
    pub owner_id: String,
    pub mode: EnrichmentMode,
    pub request_type: RequestType,
    pub list_name: String,
    pub record_count: i32,
    pub input_snapshot: serde_json::Value,
}

/// Outcome of a terminal write against the job store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// This call moved the job into its terminal state.
    Completed { credits_used: i64 },
    /// The job was already terminal; nothing was written.
    AlreadyTerminal {
        status: JobStatus,
        credits_used: Option<i64>,
    },
}

/// Number of an owner's jobs in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: i64,
    pub processing: i64,
    pub terminated: i64,
    pub failed: i64,
}

impl JobCounts {
    pub fn add(&mut self, status: JobStatus, count: i64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Terminated => self.terminated += count,
            JobStatus::Failed => self.failed += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.terminated + self.failed
    }
}
