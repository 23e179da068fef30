use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credit balance for one owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditAccount {
    pub owner_id: String,
    pub total_credits: i64,
    pub used_credits: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    /// May be negative: charges for delivered data are never refused, so
    /// concurrent completions at the credit boundary can overrun.
    pub fn remaining(&self) -> i64 {
        self.total_credits - self.used_credits
    }
}

/// Result of the advisory balance check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditCheck {
    pub ok: bool,
    pub remaining: i64,
    pub required: i64,
}

/// Outcome of a ledger charge keyed by job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    Applied,
    /// A charge for this job was already recorded; the balance is unchanged.
    AlreadyApplied,
}

/// Aggregate view of an owner's jobs and balance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageStats {
    pub total_jobs: i64,
    pub terminated_jobs: i64,
    pub in_flight_jobs: i64,
    pub failed_jobs: i64,
    pub total_credits: i64,
    pub used_credits: i64,
    pub remaining_credits: i64,
}
