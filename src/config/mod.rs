use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the worker.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Enrichment provider base URL
    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String,

    /// Enrichment provider API key
    pub provider_api_key: String,

    /// Per-request timeout for provider calls
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Delay between polls of a healthy job, and between worker cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Due jobs fetched per worker cycle
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: i64,

    /// Jobs polled in parallel within one cycle
    #[serde(default = "default_poll_concurrency")]
    pub poll_concurrency: usize,

    /// Upper bound on a single poll, including persistence
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Cap for the transient-failure backoff
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Consecutive transient failures before a job is reported as stalled
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: i32,

    /// Failed charge attempts before a charge is flagged for manual reconciliation
    #[serde(default = "default_charge_retry_limit")]
    pub charge_retry_limit: i32,

    /// Prometheus listener of the worker process
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,

    /// Starting allotment for newly opened accounts
    #[serde(default = "default_trial_credits")]
    pub trial_credits: i64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_provider_base_url() -> String {
    "https://app.bettercontact.rocks".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_poll_batch_size() -> i64 {
    100
}

fn default_poll_concurrency() -> usize {
    16
}

fn default_poll_timeout_secs() -> u64 {
    60
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_stall_threshold() -> i32 {
    10
}

fn default_charge_retry_limit() -> i32 {
    5
}

fn default_trial_credits() -> i64 {
    50
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            base_url: self.provider_base_url.trim_end_matches('/').to_string(),
            api_key: self.provider_api_key.clone(),
            timeout: Duration::from_secs(self.provider_timeout_secs),
        }
    }

    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            batch_size: self.poll_batch_size.max(1),
            concurrency: self.poll_concurrency.max(1),
            poll_timeout: Duration::from_secs(self.poll_timeout_secs.max(1)),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            stall_threshold: self.stall_threshold,
            charge_retry_limit: self.charge_retry_limit.max(1),
        }
    }
}

/// Connection settings for the enrichment provider client.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Scheduling and retry policy for the poller/reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub concurrency: usize,
    pub poll_timeout: Duration,
    pub max_backoff: Duration,
    pub stall_threshold: i32,
    pub charge_retry_limit: i32,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(default_poll_interval_secs()),
            batch_size: default_poll_batch_size(),
            concurrency: default_poll_concurrency(),
            poll_timeout: Duration::from_secs(default_poll_timeout_secs()),
            max_backoff: Duration::from_secs(default_max_backoff_secs()),
            stall_threshold: default_stall_threshold(),
            charge_retry_limit: default_charge_retry_limit(),
        }
    }
}
