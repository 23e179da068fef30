use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::str::FromStr;

use crate::models::contact::ResultRecord;
use crate::models::job::{
    ChargeStatus, Completion, EnrichmentJob, EnrichmentMode, JobCounts, JobStatus, NewJob,
    RequestType,
};
use crate::ports::{JobStore, StoreError};

const JOB_COLUMNS: &str = r#"
    job_id, owner_id, mode, request_type, list_name, record_count, status,
    input_snapshot, credits_used, charge_status, charge_attempts, poll_failures,
    next_poll_at, last_error, created_at, updated_at, processing_started_at, completed_at
"#;

/// Rows per multi-row insert; keeps bind parameters well under the
/// Postgres limit of 65535.
const RESULT_INSERT_CHUNK: usize = 1000;

/// Postgres-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert_job(&self, job: NewJob) -> Result<EnrichmentJob, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO enrichment_jobs
                (job_id, owner_id, mode, request_type, list_name, record_count, status, input_snapshot)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(&job.job_id)
            .bind(&job.owner_id)
            .bind(<&str>::from(job.mode))
            .bind(<&str>::from(job.request_type))
            .bind(&job.list_name)
            .bind(job.record_count)
            .bind(&job.input_snapshot)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    StoreError::Duplicate(job.job_id.clone())
                }
                other => StoreError::Database(other),
            })?;

        job_from_row(&row)
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<EnrichmentJob>, StoreError> {
        let sql = format!("SELECT {} FROM enrichment_jobs WHERE job_id = $1", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_jobs(
        &self,
        owner_id: &str,
        limit: i64,
    ) -> Result<Vec<EnrichmentJob>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM enrichment_jobs
            WHERE owner_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn count_jobs(&self, owner_id: &str) -> Result<JobCounts, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM enrichment_jobs
            WHERE owner_id = $1
            GROUP BY status
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = JobCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            counts.add(parse_enum(&status)?, count);
        }
        Ok(counts)
    }

    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EnrichmentJob>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM enrichment_jobs
            WHERE status IN ('pending', 'processing')
              AND next_poll_at <= $1
            ORDER BY next_poll_at ASC, created_at ASC
            LIMIT $2
            "#,
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn mark_processing(&self, job_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE enrichment_jobs
            SET status = 'processing',
                processing_started_at = NOW()
            WHERE job_id = $1 AND status = 'pending'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn schedule_poll(
        &self,
        job_id: &str,
        next_poll_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE enrichment_jobs
            SET poll_failures = 0,
                last_error = NULL,
                next_poll_at = $2
            WHERE job_id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(job_id)
        .bind(next_poll_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_poll_failure(
        &self,
        job_id: &str,
        error: &str,
        next_poll_at: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE enrichment_jobs
            SET poll_failures = poll_failures + 1,
                last_error = $2,
                next_poll_at = $3
            WHERE job_id = $1 AND status IN ('pending', 'processing')
            RETURNING poll_failures
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(next_poll_at)
        .fetch_optional(&self.pool)
        .await?;

        // A job that went terminal in the meantime has nothing left to retry.
        match row {
            Some(r) => Ok(r.try_get("poll_failures")?),
            None => Ok(0),
        }
    }

    async fn mark_failed(&self, job_id: &str, reason: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE enrichment_jobs
            SET status = 'failed',
                last_error = $2,
                charge_status = 'not_required',
                completed_at = NOW()
            WHERE job_id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(job_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_with_results(
        &self,
        job_id: &str,
        results: &[ResultRecord],
        credits_used: i64,
    ) -> Result<Completion, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises concurrent reconcilers of the same job.
        let row = sqlx::query(
            "SELECT status, credits_used FROM enrichment_jobs WHERE job_id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        let status: JobStatus = parse_enum(&row.try_get::<String, _>("status")?)?;
        if status.is_terminal() {
            let credits_used: Option<i64> = row.try_get("credits_used")?;
            tx.rollback().await?;
            return Ok(Completion::AlreadyTerminal {
                status,
                credits_used,
            });
        }

        for chunk in results.chunks(RESULT_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO enrichment_results (job_id, owner_id, first_name, last_name, company, \
                 company_domain, linkedin_url, email_address, phone_number, source, enriched) ",
            );
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(record.job_id.clone())
                    .push_bind(record.owner_id.clone())
                    .push_bind(record.first_name.clone())
                    .push_bind(record.last_name.clone())
                    .push_bind(record.company.clone())
                    .push_bind(record.company_domain.clone())
                    .push_bind(record.linkedin_url.clone())
                    .push_bind(record.email_address.clone())
                    .push_bind(record.phone_number.clone())
                    .push_bind(record.source.clone())
                    .push_bind(record.enriched);
            });
            builder.build().execute(&mut *tx).await?;
        }

        let charge_status = if credits_used > 0 {
            ChargeStatus::Pending
        } else {
            ChargeStatus::NotRequired
        };

        sqlx::query(
            r#"
            UPDATE enrichment_jobs
            SET status = 'terminated',
                credits_used = $2,
                charge_status = $3,
                poll_failures = 0,
                last_error = NULL,
                completed_at = NOW()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(credits_used)
        .bind(<&str>::from(charge_status))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Completion::Completed { credits_used })
    }

    async fn get_results(&self, job_id: &str) -> Result<Vec<ResultRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, owner_id, first_name, last_name, company, company_domain,
                   linkedin_url, email_address, phone_number, source, enriched
            FROM enrichment_results
            WHERE job_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<ResultRecord, StoreError> {
                Ok(ResultRecord {
                    job_id: r.try_get("job_id")?,
                    owner_id: r.try_get("owner_id")?,
                    first_name: r.try_get("first_name")?,
                    last_name: r.try_get("last_name")?,
                    company: r.try_get("company")?,
                    company_domain: r.try_get("company_domain")?,
                    linkedin_url: r.try_get("linkedin_url")?,
                    email_address: r.try_get("email_address")?,
                    phone_number: r.try_get("phone_number")?,
                    source: r.try_get("source")?,
                    enriched: r.try_get("enriched")?,
                })
            })
            .collect()
    }

    async fn unsettled_charges(&self, limit: i64) -> Result<Vec<EnrichmentJob>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM enrichment_jobs
            WHERE status = 'terminated' AND charge_status = 'pending'
            ORDER BY completed_at ASC
            LIMIT $1
            "#,
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn mark_charge_applied(&self, job_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE enrichment_jobs
            SET charge_status = 'applied',
                last_error = NULL
            WHERE job_id = $1 AND charge_status IN ('pending', 'flagged')
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_charge_failure(
        &self,
        job_id: &str,
        error: &str,
        flag: bool,
    ) -> Result<i32, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE enrichment_jobs
            SET charge_attempts = charge_attempts + 1,
                last_error = $2,
                charge_status = CASE WHEN $3 THEN 'flagged' ELSE charge_status END
            WHERE job_id = $1
            RETURNING charge_attempts
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(flag)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        Ok(row.try_get("charge_attempts")?)
    }
}

fn parse_enum<T: FromStr>(value: &str) -> Result<T, StoreError> {
    T::from_str(value).map_err(|_| StoreError::Corrupt(format!("unexpected value '{}'", value)))
}

fn job_from_row(r: &PgRow) -> Result<EnrichmentJob, StoreError> {
    let mode: String = r.try_get("mode")?;
    let request_type: String = r.try_get("request_type")?;
    let status: String = r.try_get("status")?;
    let charge_status: String = r.try_get("charge_status")?;

    Ok(EnrichmentJob {
        job_id: r.try_get("job_id")?,
        owner_id: r.try_get("owner_id")?,
        mode: parse_enum::<EnrichmentMode>(&mode)?,
        request_type: parse_enum::<RequestType>(&request_type)?,
        list_name: r.try_get("list_name")?,
        record_count: r.try_get("record_count")?,
        status: parse_enum::<JobStatus>(&status)?,
        input_snapshot: r.try_get("input_snapshot")?,
        credits_used: r.try_get("credits_used")?,
        charge_status: parse_enum::<ChargeStatus>(&charge_status)?,
        charge_attempts: r.try_get("charge_attempts")?,
        poll_failures: r.try_get("poll_failures")?,
        next_poll_at: r.try_get("next_poll_at")?,
        last_error: r.try_get("last_error")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
        processing_started_at: r.try_get("processing_started_at")?,
        completed_at: r.try_get("completed_at")?,
    })
}
