use sqlx::PgPool;
use std::sync::Arc;

use crate::ports::{CreditLedger, JobStore, ProviderGateway};
use crate::config::ReconcilerSettings;
use crate::services::{
    queries::EnrichmentQueries, reconciler::Reconciler, submission::SubmissionGateway,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Kept for the health check; `None` when running on in-memory stores.
    pub db: Option<PgPool>,
    pub submission: Arc<SubmissionGateway>,
    pub queries: Arc<EnrichmentQueries>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(
        db: Option<PgPool>,
        provider: Arc<dyn ProviderGateway>,
        jobs: Arc<dyn JobStore>,
        ledger: Arc<dyn CreditLedger>,
        settings: ReconcilerSettings,
        trial_credits: i64,
    ) -> Self {
        let submission = SubmissionGateway::new(provider.clone(), jobs.clone(), ledger.clone());
        let queries = EnrichmentQueries::new(
            jobs.clone(),
            ledger.clone(),
            settings.stall_threshold,
            trial_credits,
        );
        let reconciler = Reconciler::new(provider, jobs, ledger, settings);

        Self {
            db,
            submission: Arc::new(submission),
            queries: Arc::new(queries),
            reconciler: Arc::new(reconciler),
        }
    }
}
