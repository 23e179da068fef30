use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::credits::{ChargeOutcome, CreditAccount};
use crate::ports::{CreditLedger, LedgerError};

/// Postgres-backed credit ledger.
///
/// Balances only ever change through single SQL statements inside a
/// transaction, so concurrent charges for one owner serialise on the
/// account row instead of in application memory.
#[derive(Clone)]
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn account(&self, owner_id: &str) -> Result<Option<CreditAccount>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT owner_id, total_credits, used_credits, created_at, updated_at
            FROM credit_accounts
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn open_account(
        &self,
        owner_id: &str,
        total_credits: i64,
    ) -> Result<CreditAccount, LedgerError> {
        if total_credits < 0 {
            return Err(LedgerError::InvalidAmount(total_credits));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO credit_accounts (owner_id, total_credits, used_credits)
            VALUES ($1, $2, 0)
            ON CONFLICT (owner_id) DO NOTHING
            RETURNING owner_id, total_credits, used_credits, created_at, updated_at
            "#,
        )
        .bind(owner_id)
        .bind(total_credits)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => account_from_row(&row),
            None => self
                .account(owner_id)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(owner_id.to_string())),
        }
    }

    async fn charge(
        &self,
        owner_id: &str,
        job_id: &str,
        amount: i64,
    ) -> Result<ChargeOutcome, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO credit_charges (job_id, owner_id, amount)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(owner_id)
        .bind(amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                LedgerError::AccountNotFound(owner_id.to_string())
            }
            other => LedgerError::Database(other),
        })?;

        if recorded.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ChargeOutcome::AlreadyApplied);
        }

        let updated = sqlx::query(
            r#"
            UPDATE credit_accounts
            SET used_credits = used_credits + $2
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(LedgerError::AccountNotFound(owner_id.to_string()));
        }

        tx.commit().await?;
        Ok(ChargeOutcome::Applied)
    }

    async fn replenish(
        &self,
        owner_id: &str,
        total_credits: i64,
    ) -> Result<CreditAccount, LedgerError> {
        if total_credits < 0 {
            return Err(LedgerError::InvalidAmount(total_credits));
        }

        let row = sqlx::query(
            r#"
            UPDATE credit_accounts
            SET total_credits = $2,
                used_credits = 0
            WHERE owner_id = $1
            RETURNING owner_id, total_credits, used_credits, created_at, updated_at
            "#,
        )
        .bind(owner_id)
        .bind(total_credits)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(owner_id.to_string()))?;

        account_from_row(&row)
    }
}

fn account_from_row(r: &PgRow) -> Result<CreditAccount, LedgerError> {
    Ok(CreditAccount {
        owner_id: r.try_get("owner_id")?,
        total_credits: r.try_get("total_credits")?,
        used_credits: r.try_get("used_credits")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}
