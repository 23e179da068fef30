use garde::Validate;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::error::EnrichError;
use crate::models::api::SubmitRequest;
use crate::models::contact::{ContactRecord, CustomFields, OutboundRecord};
use crate::models::job::{EnrichmentJob, EnrichmentMode, NewJob, RequestType};
use crate::ports::{CreditLedger, EnrichmentBatch, JobStore, ProviderGateway, StoreError};
use crate::services::pricing;

const INSERT_ATTEMPTS: u32 = 3;
const INSERT_RETRY_DELAY_MS: u64 = 200;

/// Invalid records listed in a validation error before truncating.
const MAX_REPORTED_RECORDS: usize = 20;

/// A validated batch ready to be sent to the provider.
#[derive(Debug, Clone)]
pub struct Submission {
    pub owner_id: String,
    pub mode: EnrichmentMode,
    pub request_type: RequestType,
    pub list_name: Option<String>,
    pub file_name: Option<String>,
    pub sheet_name: Option<String>,
    pub records: Vec<ContactRecord>,
}

impl TryFrom<SubmitRequest> for Submission {
    type Error = EnrichError;

    fn try_from(request: SubmitRequest) -> Result<Self, Self::Error> {
        request
            .validate()
            .map_err(|report| EnrichError::Validation(report.to_string()))?;

        let mode = request.resolved_mode().ok_or_else(|| {
            EnrichError::Validation("at least one of email or phone enrichment is required".into())
        })?;

        Ok(Self {
            owner_id: request.owner_id,
            mode,
            request_type: request.request_type,
            list_name: request.list_name,
            file_name: request.file_name,
            sheet_name: request.sheet_name,
            records: request.records,
        })
    }
}

/// A job accepted by the provider and recorded locally.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    pub job: EnrichmentJob,
    pub worst_case_credits: i64,
}

/// Validates batches, runs the advisory credit check, forwards to the
/// provider and records the pending job.
pub struct SubmissionGateway {
    provider: Arc<dyn ProviderGateway>,
    jobs: Arc<dyn JobStore>,
    ledger: Arc<dyn CreditLedger>,
}

impl SubmissionGateway {
    pub fn new(
        provider: Arc<dyn ProviderGateway>,
        jobs: Arc<dyn JobStore>,
        ledger: Arc<dyn CreditLedger>,
    ) -> Self {
        Self {
            provider,
            jobs,
            ledger,
        }
    }

    pub async fn submit(&self, submission: Submission) -> Result<SubmittedJob, EnrichError> {
        if submission.records.is_empty() {
            return Err(EnrichError::Validation("records must not be empty".into()));
        }
        validate_records(submission.mode, &submission.records)?;

        let worst_case_credits =
            pricing::worst_case_cost(submission.mode, submission.records.len());

        // Advisory only: concurrent submissions can both pass this check.
        let check = self
            .ledger
            .check_available(&submission.owner_id, worst_case_credits)
            .await?;
        if !check.ok {
            tracing::info!(
                owner_id = %submission.owner_id,
                required = worst_case_credits,
                remaining = check.remaining,
                "Submission rejected for insufficient credits"
            );
            return Err(EnrichError::InsufficientCredits {
                required: worst_case_credits,
                remaining: check.remaining,
            });
        }

        let list_name = resolve_list_name(&submission);
        let batch = build_batch(&submission, &list_name);

        let job_id = self.provider.create_job(&batch).await.map_err(|e| {
            tracing::warn!(owner_id = %submission.owner_id, error = %e, "Provider rejected submission");
            EnrichError::from(e)
        })?;

        let mut input_snapshot = serde_json::to_value(&batch)
            .map_err(|e| EnrichError::Persistence(format!("failed to snapshot batch: {}", e)))?;
        if let Some(obj) = input_snapshot.as_object_mut() {
            obj.insert("file_name".into(), serde_json::json!(submission.file_name));
            obj.insert("sheet_name".into(), serde_json::json!(submission.sheet_name));
            obj.insert("record_count".into(), serde_json::json!(submission.records.len()));
        }

        let new_job = NewJob {
            job_id: job_id.clone(),
            owner_id: submission.owner_id.clone(),
            mode: submission.mode,
            request_type: submission.request_type,
            list_name,
            record_count: submission.records.len() as i32,
            input_snapshot,
        };

        let job = self.insert_with_retry(new_job).await?;

        metrics::counter!("enrichment_jobs_submitted_total").increment(1);
        tracing::info!(
            job_id = %job.job_id,
            owner_id = %job.owner_id,
            mode = %job.mode,
            record_count = job.record_count,
            worst_case_credits,
            "Enrichment job submitted"
        );

        Ok(SubmittedJob {
            job,
            worst_case_credits,
        })
    }

    /// The provider already holds the job at this point, so a lost insert
    /// would orphan it.
    async fn insert_with_retry(&self, job: NewJob) -> Result<EnrichmentJob, EnrichError> {
        let mut attempt = 1;
        loop {
            match self.jobs.insert_job(job.clone()).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::Duplicate(job_id)) => {
                    tracing::error!(job_id = %job_id, "Provider returned an already recorded job id");
                    return Err(EnrichError::Persistence(format!(
                        "job {} already recorded",
                        job_id
                    )));
                }
                Err(e) if attempt < INSERT_ATTEMPTS => {
                    tracing::warn!(
                        job_id = %job.job_id,
                        attempt,
                        error = %e,
                        "Failed to record submitted job, retrying"
                    );
                    sleep(Duration::from_millis(INSERT_RETRY_DELAY_MS * attempt as u64)).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job.job_id,
                        owner_id = %job.owner_id,
                        error = %e,
                        "Provider accepted job but it could not be recorded; manual repair required"
                    );
                    return Err(e.into());
                }
            }
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Names of the fields `mode` needs that `record` lacks.
pub fn missing_fields(mode: EnrichmentMode, record: &ContactRecord) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if mode.wants_email() {
        if !present(&record.first_name) {
            missing.push("first_name");
        }
        if !present(&record.last_name) {
            missing.push("last_name");
        }
        if !present(&record.company) && !present(&record.company_domain) {
            missing.push("company or company_domain");
        }
    }
    if mode.wants_phone() && !present(&record.linkedin_url) {
        missing.push("linkedin_url");
    }
    missing
}

/// Reject the whole batch if any record lacks what the mode needs.
pub fn validate_records(mode: EnrichmentMode, records: &[ContactRecord]) -> Result<(), EnrichError> {
    let problems: Vec<String> = records
        .iter()
        .enumerate()
        .filter_map(|(idx, record)| {
            let missing = missing_fields(mode, record);
            (!missing.is_empty()).then(|| format!("record {}: missing {}", idx, missing.join(", ")))
        })
        .collect();

    if problems.is_empty() {
        return Ok(());
    }

    let mut message = problems
        .iter()
        .take(MAX_REPORTED_RECORDS)
        .cloned()
        .collect::<Vec<_>>()
        .join("; ");
    if problems.len() > MAX_REPORTED_RECORDS {
        message.push_str(&format!(
            "; and {} more",
            problems.len() - MAX_REPORTED_RECORDS
        ));
    }
    Err(EnrichError::Validation(message))
}

fn resolve_list_name(submission: &Submission) -> String {
    if let Some(name) = submission.list_name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }

    match submission.request_type {
        RequestType::Individual => "individual-enrichment".to_string(),
        RequestType::File => {
            let mut name = String::from("file-enrichment");
            if let Some(file) = submission.file_name.as_deref() {
                name.push('-');
                name.push_str(file);
            }
            if let Some(sheet) = submission.sheet_name.as_deref() {
                name.push('-');
                name.push_str(sheet);
            }
            name
        }
    }
}

fn build_batch(submission: &Submission, list_name: &str) -> EnrichmentBatch {
    let data = submission
        .records
        .iter()
        .map(|contact| OutboundRecord {
            contact: contact.clone(),
            custom_fields: CustomFields {
                uuid: Uuid::new_v4().to_string(),
                list_name: list_name.to_string(),
            },
        })
        .collect();

    EnrichmentBatch {
        data,
        enrich_email_address: submission.mode.wants_email(),
        enrich_phone_number: submission.mode.wants_phone(),
    }
}
