//! Credit pricing for enrichment results.
//!
//! Callers are charged for what the provider actually discovered, never for
//! the shape of the request.

use serde::Serialize;

use crate::models::contact::ResultRow;
use crate::models::job::EnrichmentMode;

pub const EMAIL_CREDITS: i64 = 1;
pub const PHONE_CREDITS: i64 = 10;
pub const BOTH_CREDITS: i64 = EMAIL_CREDITS + PHONE_CREDITS;

/// Most expensive per-record outcome for a mode.
pub fn per_record_max(mode: EnrichmentMode) -> i64 {
    match mode {
        EnrichmentMode::Email => EMAIL_CREDITS,
        EnrichmentMode::Phone => PHONE_CREDITS,
        EnrichmentMode::Both => BOTH_CREDITS,
    }
}

/// Upper bound used by the advisory pre-check.
pub fn worst_case_cost(mode: EnrichmentMode, record_count: usize) -> i64 {
    record_count as i64 * per_record_max(mode)
}

/// What a single result row discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Both,
    EmailOnly,
    PhoneOnly,
    Nothing,
}

impl Outcome {
    pub fn classify(row: &ResultRow) -> Self {
        match (row.discovered_email().is_some(), row.discovered_phone().is_some()) {
            (true, true) => Outcome::Both,
            (true, false) => Outcome::EmailOnly,
            (false, true) => Outcome::PhoneOnly,
            (false, false) => Outcome::Nothing,
        }
    }

    pub fn credits(&self) -> i64 {
        match self {
            Outcome::Both => BOTH_CREDITS,
            Outcome::EmailOnly => EMAIL_CREDITS,
            Outcome::PhoneOnly => PHONE_CREDITS,
            Outcome::Nothing => 0,
        }
    }
}

/// Per-outcome tally for one batch of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    pub both: usize,
    pub email_only: usize,
    pub phone_only: usize,
    pub nothing: usize,
    pub total_credits: i64,
}

pub fn price_results(rows: &[ResultRow]) -> CostBreakdown {
    rows.iter().fold(CostBreakdown::default(), |mut acc, row| {
        let outcome = Outcome::classify(row);
        match outcome {
            Outcome::Both => acc.both += 1,
            Outcome::EmailOnly => acc.email_only += 1,
            Outcome::PhoneOnly => acc.phone_only += 1,
            Outcome::Nothing => acc.nothing += 1,
        }
        acc.total_credits += outcome.credits();
        acc
    })
}
