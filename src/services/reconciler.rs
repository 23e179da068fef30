//! Poller/reconciler for submitted enrichment jobs.
//!
//! Each cycle polls every due job against the provider, advances its status,
//! and on a terminal answer converts the provider rows into persisted results
//! and exactly one ledger charge. Jobs never leave a terminal state and a
//! failed job is never charged.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{timeout, MissedTickBehavior};

use crate::config::ReconcilerSettings;
use crate::error::EnrichError;
use crate::models::contact::{ResultRecord, ResultRow};
use crate::models::credits::ChargeOutcome;
use crate::models::job::{Completion, EnrichmentJob, JobStatus};
use crate::ports::{CreditLedger, JobStore, ProviderError, ProviderGateway, ProviderStatus};
use crate::services::pricing;

/// What happened to the ledger charge of a terminated job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeState {
    Applied,
    /// The ledger already held a charge for this job.
    AlreadyApplied,
    NotRequired,
    /// The charge failed and will be retried on a later cycle.
    Deferred,
    /// Retries exhausted; needs manual reconciliation.
    Flagged,
}

/// Result of polling one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Provider is still working on the job.
    InFlight,
    /// Provider could not be reached; the job state is unchanged.
    Retrying { failures: i32 },
    Failed,
    Terminated {
        credits_used: i64,
        charge: ChargeState,
    },
    /// The job was already terminal locally; nothing to do.
    AlreadyTerminal,
}

/// Tally of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub polled: usize,
    pub in_flight: usize,
    pub retrying: usize,
    pub terminated: usize,
    pub failed: usize,
    pub errors: usize,
    pub charges_settled: usize,
    pub charges_deferred: usize,
    pub charges_flagged: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.polled == 0 && self.charges_settled + self.charges_deferred + self.charges_flagged == 0
    }

    fn record_charge(&mut self, state: ChargeState) {
        match state {
            ChargeState::Applied | ChargeState::AlreadyApplied => self.charges_settled += 1,
            ChargeState::Deferred => self.charges_deferred += 1,
            ChargeState::Flagged => self.charges_flagged += 1,
            ChargeState::NotRequired => {}
        }
    }
}

/// Delay before the next poll after `failures` consecutive transient errors.
pub fn backoff_delay(base: Duration, failures: i32, cap: Duration) -> Duration {
    let exponent = failures.saturating_sub(1).clamp(0, 16) as u32;
    base.saturating_mul(1u32 << exponent).min(cap)
}

fn poll_at(delay: Duration) -> DateTime<Utc> {
    let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(1));
    Utc::now() + delay
}

pub struct Reconciler {
    provider: Arc<dyn ProviderGateway>,
    jobs: Arc<dyn JobStore>,
    ledger: Arc<dyn CreditLedger>,
    settings: ReconcilerSettings,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn ProviderGateway>,
        jobs: Arc<dyn JobStore>,
        ledger: Arc<dyn CreditLedger>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            provider,
            jobs,
            ledger,
            settings,
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Run cycles every poll interval until `shutdown` resolves. A cycle in
    /// progress always finishes.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        // tokio rejects a zero period.
        let period = self.settings.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping reconciler");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(report) if report.is_idle() => {
                            tracing::trace!("No due jobs, sleeping");
                        }
                        Ok(report) => {
                            tracing::info!(
                                polled = report.polled,
                                in_flight = report.in_flight,
                                retrying = report.retrying,
                                terminated = report.terminated,
                                failed = report.failed,
                                errors = report.errors,
                                charges_settled = report.charges_settled,
                                charges_deferred = report.charges_deferred,
                                charges_flagged = report.charges_flagged,
                                "Reconciliation cycle complete"
                            );
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Reconciliation cycle failed, will retry");
                        }
                    }
                }
            }
        }
    }

    /// Poll every due job concurrently, then retry outstanding charges.
    pub async fn run_cycle(&self) -> Result<CycleReport, EnrichError> {
        let due = self
            .jobs
            .due_jobs(Utc::now(), self.settings.batch_size)
            .await?;

        let mut report = CycleReport {
            polled: due.len(),
            ..Default::default()
        };

        let outcomes: Vec<(String, Result<PollOutcome, EnrichError>)> = stream::iter(due)
            .map(|job| async move {
                let outcome = self.poll_with_timeout(&job).await;
                (job.job_id, outcome)
            })
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        for (job_id, outcome) in outcomes {
            match outcome {
                Ok(PollOutcome::InFlight) => report.in_flight += 1,
                Ok(PollOutcome::Retrying { .. }) => report.retrying += 1,
                Ok(PollOutcome::Failed) => report.failed += 1,
                Ok(PollOutcome::Terminated { charge, .. }) => {
                    report.terminated += 1;
                    report.record_charge(charge);
                }
                Ok(PollOutcome::AlreadyTerminal) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(job_id = %job_id, error = %e, "Failed to poll job, will retry");
                }
            }
        }

        match self.settle_outstanding_charges().await {
            Ok(states) => states.into_iter().for_each(|s| report.record_charge(s)),
            Err(e) => {
                report.errors += 1;
                tracing::error!(error = %e, "Failed to load outstanding charges");
            }
        }

        Ok(report)
    }

    /// Poll one job by id right away, ignoring its schedule.
    pub async fn poll_now(&self, job_id: &str) -> Result<PollOutcome, EnrichError> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| EnrichError::JobNotFound(job_id.to_string()))?;

        if job.status.is_terminal() {
            // Only the charge may still be outstanding.
            if job.status == JobStatus::Terminated {
                let charge = self.settle_charge(&job, job.credits_used.unwrap_or(0)).await;
                return Ok(PollOutcome::Terminated {
                    credits_used: job.credits_used.unwrap_or(0),
                    charge,
                });
            }
            return Ok(PollOutcome::AlreadyTerminal);
        }

        self.poll_with_timeout(&job).await
    }

    async fn poll_with_timeout(&self, job: &EnrichmentJob) -> Result<PollOutcome, EnrichError> {
        match timeout(self.settings.poll_timeout, self.poll_job(job)).await {
            Ok(outcome) => outcome,
            Err(_) => self.handle_transient(job, &ProviderError::Timeout).await,
        }
    }

    /// One step of the job state machine.
    pub async fn poll_job(&self, job: &EnrichmentJob) -> Result<PollOutcome, EnrichError> {
        if job.status.is_terminal() {
            return Ok(PollOutcome::AlreadyTerminal);
        }

        let started = Instant::now();
        let status = self.provider.fetch_status(&job.job_id).await;
        metrics::histogram!("enrichment_poll_seconds").record(started.elapsed().as_secs_f64());

        match status {
            Err(e) => {
                // A missing answer is never a failure; even non-retryable
                // responses leave the job pending for manual follow-up.
                if !e.is_retryable() {
                    tracing::error!(
                        job_id = %job.job_id,
                        error = %e,
                        "Provider refused status request; job left pending"
                    );
                }
                self.handle_transient(job, &e).await
            }
            Ok(ProviderStatus::Pending) | Ok(ProviderStatus::Processing) => {
                if job.status.can_transition_to(JobStatus::Processing)
                    && self.jobs.mark_processing(&job.job_id).await?
                {
                    tracing::info!(job_id = %job.job_id, "Job is processing");
                }
                self.jobs
                    .schedule_poll(&job.job_id, poll_at(self.settings.poll_interval))
                    .await?;
                Ok(PollOutcome::InFlight)
            }
            Ok(ProviderStatus::Failed(reason)) => {
                if self.jobs.mark_failed(&job.job_id, &reason).await? {
                    metrics::counter!("enrichment_jobs_failed_total").increment(1);
                    tracing::warn!(
                        job_id = %job.job_id,
                        owner_id = %job.owner_id,
                        reason = %reason,
                        "Provider reported job failure; no credits charged"
                    );
                    Ok(PollOutcome::Failed)
                } else {
                    Ok(PollOutcome::AlreadyTerminal)
                }
            }
            Ok(ProviderStatus::Terminated(rows)) => self.reconcile(job, &rows).await,
        }
    }

    async fn handle_transient(
        &self,
        job: &EnrichmentJob,
        error: &ProviderError,
    ) -> Result<PollOutcome, EnrichError> {
        metrics::counter!("enrichment_provider_errors_total").increment(1);

        let expected = job.poll_failures.saturating_add(1);
        let delay = backoff_delay(self.settings.poll_interval, expected, self.settings.max_backoff);
        let failures = self
            .jobs
            .record_poll_failure(&job.job_id, &error.to_string(), poll_at(delay))
            .await?;

        if failures == self.settings.stall_threshold {
            tracing::warn!(
                job_id = %job.job_id,
                owner_id = %job.owner_id,
                failures,
                "Provider unreachable for job; reporting as stalled, still polling"
            );
        } else {
            tracing::debug!(
                job_id = %job.job_id,
                failures,
                retry_in_secs = delay.as_secs(),
                error = %error,
                "Transient provider error"
            );
        }

        Ok(PollOutcome::Retrying { failures })
    }

    /// Persist the provider's rows and charge for what they discovered.
    ///
    /// Safe to repeat: a job that is already terminated keeps its stored
    /// results and cost, and the ledger charge is keyed by job id.
    pub async fn reconcile(
        &self,
        job: &EnrichmentJob,
        rows: &[ResultRow],
    ) -> Result<PollOutcome, EnrichError> {
        let breakdown = pricing::price_results(rows);
        let ceiling = pricing::worst_case_cost(job.mode, job.record_count.max(0) as usize);
        let total_credits = if breakdown.total_credits > ceiling {
            tracing::error!(
                job_id = %job.job_id,
                owner_id = %job.owner_id,
                record_count = job.record_count,
                rows = rows.len(),
                priced = breakdown.total_credits,
                credits = ceiling,
                "Provider returned more than was submitted; charge capped"
            );
            ceiling
        } else {
            breakdown.total_credits
        };
        let records: Vec<ResultRecord> = rows
            .iter()
            .map(|row| ResultRecord::from_row(&job.job_id, &job.owner_id, row))
            .collect();

        let completion = self
            .jobs
            .complete_with_results(&job.job_id, &records, total_credits)
            .await?;

        let credits_used = match completion {
            Completion::Completed { credits_used } => {
                metrics::counter!("enrichment_jobs_terminated_total").increment(1);
                tracing::info!(
                    job_id = %job.job_id,
                    owner_id = %job.owner_id,
                    results = records.len(),
                    both = breakdown.both,
                    email_only = breakdown.email_only,
                    phone_only = breakdown.phone_only,
                    nothing = breakdown.nothing,
                    credits = credits_used,
                    "Job terminated, results stored"
                );
                credits_used
            }
            Completion::AlreadyTerminal {
                status: JobStatus::Terminated,
                credits_used,
            } => credits_used.unwrap_or(0),
            Completion::AlreadyTerminal { .. } => return Ok(PollOutcome::AlreadyTerminal),
        };

        let charge = self.settle_charge(job, credits_used).await;
        Ok(PollOutcome::Terminated {
            credits_used,
            charge,
        })
    }

    /// Apply the job's charge. Failures are recorded on the job and retried
    /// on later cycles, never dropped.
    async fn settle_charge(&self, job: &EnrichmentJob, amount: i64) -> ChargeState {
        if amount <= 0 {
            return ChargeState::NotRequired;
        }

        match self.ledger.charge(&job.owner_id, &job.job_id, amount).await {
            Ok(outcome) => {
                if let Err(e) = self.jobs.mark_charge_applied(&job.job_id).await {
                    // The next cycle re-confirms against the ledger.
                    tracing::warn!(
                        job_id = %job.job_id,
                        error = %e,
                        "Charge applied but settlement not recorded"
                    );
                }
                match outcome {
                    ChargeOutcome::Applied => {
                        metrics::counter!("enrichment_credits_charged_total").increment(amount as u64);
                        tracing::info!(
                            job_id = %job.job_id,
                            owner_id = %job.owner_id,
                            credits = amount,
                            "Credits charged"
                        );
                        ChargeState::Applied
                    }
                    ChargeOutcome::AlreadyApplied => {
                        tracing::debug!(job_id = %job.job_id, "Charge already applied");
                        ChargeState::AlreadyApplied
                    }
                }
            }
            Err(e) => {
                metrics::counter!("enrichment_charge_failures_total").increment(1);
                let attempts = job.charge_attempts.saturating_add(1);
                let flag = attempts >= self.settings.charge_retry_limit;

                if let Err(store_err) = self
                    .jobs
                    .record_charge_failure(&job.job_id, &e.to_string(), flag)
                    .await
                {
                    tracing::error!(
                        job_id = %job.job_id,
                        error = %store_err,
                        "Failed to record charge failure"
                    );
                }

                if flag {
                    tracing::error!(
                        job_id = %job.job_id,
                        owner_id = %job.owner_id,
                        credits = amount,
                        attempts,
                        error = %e,
                        "Charge flagged for manual reconciliation"
                    );
                    ChargeState::Flagged
                } else {
                    tracing::warn!(
                        job_id = %job.job_id,
                        owner_id = %job.owner_id,
                        credits = amount,
                        attempts,
                        error = %e,
                        "Charge failed, will retry"
                    );
                    ChargeState::Deferred
                }
            }
        }
    }

    async fn settle_outstanding_charges(&self) -> Result<Vec<ChargeState>, EnrichError> {
        let pending = self.jobs.unsettled_charges(self.settings.batch_size).await?;

        let states = stream::iter(pending)
            .map(|job| async move {
                let amount = job.credits_used.unwrap_or(0);
                self.settle_charge(&job, amount).await
            })
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        Ok(states)
    }
}
