//! In-memory doubles of the job store, credit ledger and provider.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use contact_enrich::config::ReconcilerSettings;
use contact_enrich::models::contact::{ContactRecord, ResultRecord, ResultRow};
use contact_enrich::models::credits::{ChargeOutcome, CreditAccount};
use contact_enrich::models::job::{
    ChargeStatus, Completion, EnrichmentJob, EnrichmentMode, JobCounts, JobStatus, NewJob,
    RequestType,
};
use contact_enrich::ports::{
    CreditLedger, EnrichmentBatch, JobStore, LedgerError, ProviderError, ProviderGateway,
    ProviderStatus, StoreError,
};

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, EnrichmentJob>>,
    results: Mutex<HashMap<String, Vec<ResultRecord>>>,
    fail_writes: AtomicBool,
    insert_failures: AtomicUsize,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every terminal write fail until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `n` inserts.
    pub fn fail_inserts(&self, n: usize) {
        self.insert_failures.store(n, Ordering::SeqCst);
    }

    pub async fn snapshot(&self, job_id: &str) -> Option<EnrichmentJob> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn result_count(&self, job_id: &str) -> usize {
        self.results
            .lock()
            .await
            .get(job_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Seed a job directly, due immediately.
    pub async fn seed(&self, job_id: &str, owner_id: &str, mode: EnrichmentMode, records: i32) {
        let now = Utc::now();
        let job = EnrichmentJob {
            job_id: job_id.to_string(),
            owner_id: owner_id.to_string(),
            mode,
            request_type: RequestType::Individual,
            list_name: "Test list".to_string(),
            record_count: records,
            status: JobStatus::Pending,
            input_snapshot: serde_json::json!({}),
            credits_used: None,
            charge_status: ChargeStatus::NotRequired,
            charge_attempts: 0,
            poll_failures: 0,
            next_poll_at: now,
            last_error: None,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            completed_at: None,
        };
        self.jobs.lock().await.insert(job_id.to_string(), job);
    }

    /// Make a job due again regardless of its backoff.
    pub async fn make_due(&self, job_id: &str) {
        if let Some(job) = self.jobs.lock().await.get_mut(job_id) {
            job.next_poll_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    fn writes_failing(&self) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_job(&self, job: NewJob) -> Result<EnrichmentJob, StoreError> {
        let remaining = self.insert_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.insert_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected insert failure".into()));
        }

        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.job_id) {
            return Err(StoreError::Duplicate(job.job_id));
        }
        let now = Utc::now();
        let stored = EnrichmentJob {
            job_id: job.job_id.clone(),
            owner_id: job.owner_id,
            mode: job.mode,
            request_type: job.request_type,
            list_name: job.list_name,
            record_count: job.record_count,
            status: JobStatus::Pending,
            input_snapshot: job.input_snapshot,
            credits_used: None,
            charge_status: ChargeStatus::NotRequired,
            charge_attempts: 0,
            poll_failures: 0,
            next_poll_at: now,
            last_error: None,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            completed_at: None,
        };
        jobs.insert(job.job_id, stored.clone());
        Ok(stored)
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<EnrichmentJob>, StoreError> {
        Ok(self.jobs.lock().await.get(job_id).cloned())
    }

    async fn list_jobs(&self, owner_id: &str, limit: i64) -> Result<Vec<EnrichmentJob>, StoreError> {
        let mut jobs: Vec<EnrichmentJob> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|j| j.owner_id == owner_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn count_jobs(&self, owner_id: &str) -> Result<JobCounts, StoreError> {
        let mut counts = JobCounts::default();
        for job in self.jobs.lock().await.values() {
            if job.owner_id == owner_id {
                counts.add(job.status, 1);
            }
        }
        Ok(counts)
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<EnrichmentJob>, StoreError> {
        let mut due: Vec<EnrichmentJob> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|j| !j.status.is_terminal() && j.next_poll_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_poll_at.cmp(&b.next_poll_at));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_processing(&self, job_id: &str) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(job_id) {
            Some(job) if job.status.can_transition_to(JobStatus::Processing) => {
                job.status = JobStatus::Processing;
                job.processing_started_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn schedule_poll(&self, job_id: &str, next_poll_at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(job) = self.jobs.lock().await.get_mut(job_id) {
            if !job.status.is_terminal() {
                job.poll_failures = 0;
                job.next_poll_at = next_poll_at;
            }
        }
        Ok(())
    }

    async fn record_poll_failure(
        &self,
        job_id: &str,
        error: &str,
        next_poll_at: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(job_id) {
            Some(job) if !job.status.is_terminal() => {
                job.poll_failures += 1;
                job.last_error = Some(error.to_string());
                job.next_poll_at = next_poll_at;
                Ok(job.poll_failures)
            }
            Some(job) => Ok(job.poll_failures),
            None => Err(StoreError::NotFound(job_id.to_string())),
        }
    }

    async fn mark_failed(&self, job_id: &str, reason: &str) -> Result<bool, StoreError> {
        if self.writes_failing() {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(job_id) {
            Some(job) if job.status.can_transition_to(JobStatus::Failed) => {
                job.status = JobStatus::Failed;
                job.charge_status = ChargeStatus::NotRequired;
                job.last_error = Some(reason.to_string());
                job.completed_at = Some(Utc::now());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(job_id.to_string())),
        }
    }

    async fn complete_with_results(
        &self,
        job_id: &str,
        results: &[ResultRecord],
        credits_used: i64,
    ) -> Result<Completion, StoreError> {
        if self.writes_failing() {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        // Both locks are held for the whole write, like a row lock.
        let mut jobs = self.jobs.lock().await;
        let mut stored = self.results.lock().await;

        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        if !job.status.can_transition_to(JobStatus::Terminated) {
            return Ok(Completion::AlreadyTerminal {
                status: job.status,
                credits_used: job.credits_used,
            });
        }

        stored.insert(job_id.to_string(), results.to_vec());
        job.status = JobStatus::Terminated;
        job.credits_used = Some(credits_used);
        job.charge_status = if credits_used > 0 {
            ChargeStatus::Pending
        } else {
            ChargeStatus::NotRequired
        };
        job.poll_failures = 0;
        job.completed_at = Some(Utc::now());
        Ok(Completion::Completed { credits_used })
    }

    async fn get_results(&self, job_id: &str) -> Result<Vec<ResultRecord>, StoreError> {
        Ok(self
            .results
            .lock()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn unsettled_charges(&self, limit: i64) -> Result<Vec<EnrichmentJob>, StoreError> {
        let mut jobs: Vec<EnrichmentJob> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|j| j.status == JobStatus::Terminated && j.charge_status == ChargeStatus::Pending)
            .cloned()
            .collect();
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn mark_charge_applied(&self, job_id: &str) -> Result<(), StoreError> {
        if let Some(job) = self.jobs.lock().await.get_mut(job_id) {
            if matches!(job.charge_status, ChargeStatus::Pending | ChargeStatus::Flagged) {
                job.charge_status = ChargeStatus::Applied;
            }
        }
        Ok(())
    }

    async fn record_charge_failure(&self, job_id: &str, error: &str, flag: bool) -> Result<i32, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        job.charge_attempts += 1;
        job.last_error = Some(error.to_string());
        if flag {
            job.charge_status = ChargeStatus::Flagged;
        }
        Ok(job.charge_attempts)
    }
}

#[derive(Default)]
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<String, CreditAccount>>,
    charges: Mutex<HashMap<String, i64>>,
    charge_failures: AtomicUsize,
    charge_calls: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_account(owner_id: &str, total_credits: i64) -> Arc<Self> {
        let ledger = Arc::new(Self::new());
        ledger
            .open_account(owner_id, total_credits)
            .await
            .expect("open account");
        ledger
    }

    /// Fail the next `n` charge calls.
    pub fn fail_charges(&self, n: usize) {
        self.charge_failures.store(n, Ordering::SeqCst);
    }

    pub fn charge_calls(&self) -> usize {
        self.charge_calls.load(Ordering::SeqCst)
    }

    pub async fn used(&self, owner_id: &str) -> i64 {
        self.accounts
            .lock()
            .await
            .get(owner_id)
            .map(|a| a.used_credits)
            .unwrap_or(0)
    }

    pub async fn charge_for(&self, job_id: &str) -> Option<i64> {
        self.charges.lock().await.get(job_id).copied()
    }
}

#[async_trait]
impl CreditLedger for InMemoryLedger {
    async fn account(&self, owner_id: &str) -> Result<Option<CreditAccount>, LedgerError> {
        Ok(self.accounts.lock().await.get(owner_id).cloned())
    }

    async fn open_account(&self, owner_id: &str, total_credits: i64) -> Result<CreditAccount, LedgerError> {
        let mut accounts = self.accounts.lock().await;
        let now = Utc::now();
        let account = accounts
            .entry(owner_id.to_string())
            .or_insert_with(|| CreditAccount {
                owner_id: owner_id.to_string(),
                total_credits,
                used_credits: 0,
                created_at: now,
                updated_at: now,
            });
        Ok(account.clone())
    }

    async fn charge(&self, owner_id: &str, job_id: &str, amount: i64) -> Result<ChargeOutcome, LedgerError> {
        self.charge_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.charge_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.charge_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(LedgerError::Unavailable("injected charge failure".into()));
        }
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut accounts = self.accounts.lock().await;
        let mut charges = self.charges.lock().await;
        let account = accounts
            .get_mut(owner_id)
            .ok_or_else(|| LedgerError::AccountNotFound(owner_id.to_string()))?;
        if charges.contains_key(job_id) {
            return Ok(ChargeOutcome::AlreadyApplied);
        }
        charges.insert(job_id.to_string(), amount);
        account.used_credits += amount;
        account.updated_at = Utc::now();
        Ok(ChargeOutcome::Applied)
    }

    async fn replenish(&self, owner_id: &str, total_credits: i64) -> Result<CreditAccount, LedgerError> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(owner_id)
            .ok_or_else(|| LedgerError::AccountNotFound(owner_id.to_string()))?;
        account.total_credits = total_credits;
        account.used_credits = 0;
        Ok(account.clone())
    }
}

/// One scripted provider answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(ProviderStatus),
    Unreachable,
    Http(u16),
}

/// Provider double replaying scripted answers per job. The last answer
/// repeats once the script runs out.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    next_id: AtomicUsize,
    create_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    reject_creates: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn script(&self, job_id: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .await
            .insert(job_id.to_string(), replies.into());
    }

    pub fn reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    pub async fn delay_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock().await = Some(delay);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderGateway for ScriptedProvider {
    async fn create_job(&self, batch: &EnrichmentBatch) -> Result<String, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(ProviderError::Http {
                status: 503,
                body: "maintenance".into(),
            });
        }
        if batch.data.is_empty() {
            return Err(ProviderError::Rejected("empty batch".into()));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("provider-job-{}", n))
    }

    async fn fetch_status(&self, job_id: &str) -> Result<ProviderStatus, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut scripts = self.scripts.lock().await;
            let script = scripts
                .get_mut(job_id)
                .ok_or_else(|| ProviderError::Http {
                    status: 404,
                    body: "unknown job".into(),
                })?;
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        match reply {
            Some(Reply::Status(status)) => Ok(status),
            Some(Reply::Unreachable) => Err(ProviderError::Transport("connection refused".into())),
            Some(Reply::Http(status)) => Err(ProviderError::Http {
                status,
                body: String::new(),
            }),
            None => Ok(ProviderStatus::Pending),
        }
    }
}

pub fn settings() -> ReconcilerSettings {
    ReconcilerSettings {
        poll_interval: Duration::from_millis(10),
        batch_size: 100,
        concurrency: 4,
        poll_timeout: Duration::from_secs(5),
        max_backoff: Duration::from_millis(50),
        stall_threshold: 3,
        charge_retry_limit: 3,
    }
}

pub fn email_row(email: &str) -> ResultRow {
    ResultRow {
        contact_email_address: Some(email.to_string()),
        contact_phone_number: Some("not found".to_string()),
        ..Default::default()
    }
}

pub fn phone_row(phone: &str) -> ResultRow {
    ResultRow {
        contact_email_address: Some("null".to_string()),
        contact_phone_number: Some(phone.to_string()),
        ..Default::default()
    }
}

pub fn both_row(email: &str, phone: &str) -> ResultRow {
    ResultRow {
        contact_email_address: Some(email.to_string()),
        contact_phone_number: Some(phone.to_string()),
        ..Default::default()
    }
}

pub fn empty_row() -> ResultRow {
    ResultRow {
        contact_email_address: Some("not found".to_string()),
        contact_phone_number: None,
        ..Default::default()
    }
}

pub fn contact(first: &str, last: &str, domain: &str) -> ContactRecord {
    ContactRecord {
        first_name: Some(first.to_string()),
        last_name: Some(last.to_string()),
        company: None,
        company_domain: Some(domain.to_string()),
        linkedin_url: None,
    }
}
