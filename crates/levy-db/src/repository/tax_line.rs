//! # Tax Line Repository
//!
//! Tax lines of parent documents. Lines are only written by applying a
//! `TaxReconciliation`, inside one transaction.
//!
//! ## Apply Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply(&mut plan)                                                       │
//! │                                                                         │
//! │  1. validate every line to write  ──► "Illegal access" unless produced │
//! │                                       by reconciliation                 │
//! │  2. BEGIN                                                               │
//! │       INSERT to_insert                                                  │
//! │       UPDATE to_update   (missing row ──► NotFound, rollback)           │
//! │       DELETE to_delete                                                  │
//! │     COMMIT                                                              │
//! │  3. mark_saved on every written line ──► internal flag cleared          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use levy_core::{Currency, Money, Percentage, Tax, TaxReconciliation};

use crate::error::{DbError, DbResult};

/// Row shape of `tax_lines`.
#[derive(Debug, sqlx::FromRow)]
struct TaxLineRow {
    id: String,
    parent_id: String,
    region_id: String,
    type_id: String,
    rate: Percentage,
    tax_minor: i64,
    currency: String,
}

impl TryFrom<TaxLineRow> for Tax {
    type Error = DbError;

    fn try_from(row: TaxLineRow) -> Result<Self, Self::Error> {
        let currency: Currency = row.currency.parse()?;
        Ok(Tax::stored(
            row.id,
            row.parent_id,
            row.region_id,
            row.type_id,
            row.rate,
            Money::from_minor(row.tax_minor, currency),
        ))
    }
}

/// Repository for tax line operations.
#[derive(Debug, Clone)]
pub struct TaxLineRepository {
    pool: SqlitePool,
}

impl TaxLineRepository {
    /// Creates a new TaxLineRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TaxLineRepository { pool }
    }

    /// Stored lines of a parent document, in insertion order.
    pub async fn list_for_parent(&self, parent_id: &str) -> DbResult<Vec<Tax>> {
        let rows = sqlx::query_as::<_, TaxLineRow>(
            r#"
            SELECT id, parent_id, region_id, type_id, rate, tax_minor, currency
            FROM tax_lines
            WHERE parent_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(parent_id = %parent_id, count = rows.len(), "Loaded tax lines");
        rows.into_iter().map(Tax::try_from).collect()
    }

    /// Sum of the stored tax of a parent document, in minor units.
    pub async fn total_for_parent(&self, parent_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(tax_minor), 0) FROM tax_lines WHERE parent_id = ?1",
        )
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Writes a reconciliation plan in one transaction.
    pub async fn apply(&self, plan: &mut TaxReconciliation) -> DbResult<()> {
        for line in plan
            .to_insert
            .iter()
            .chain(&plan.to_update)
            .chain(&plan.to_delete)
        {
            line.validate()?;
        }

        if plan.is_noop() {
            return Ok(());
        }

        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        for line in &plan.to_insert {
            sqlx::query(
                r#"
                INSERT INTO tax_lines (
                    id, parent_id, region_id, type_id, rate, tax_minor, currency,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                "#,
            )
            .bind(line.id())
            .bind(line.parent_id())
            .bind(line.region_id())
            .bind(line.type_id())
            .bind(line.rate())
            .bind(line.tax().minor())
            .bind(line.tax().currency().to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        for line in &plan.to_update {
            let result = sqlx::query(
                r#"
                UPDATE tax_lines SET
                    rate = ?2,
                    tax_minor = ?3,
                    currency = ?4,
                    updated_at = ?5
                WHERE id = ?1
                "#,
            )
            .bind(line.id())
            .bind(line.rate())
            .bind(line.tax().minor())
            .bind(line.tax().currency().to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::not_found("Tax", line.id()));
            }
        }

        for line in &plan.to_delete {
            sqlx::query("DELETE FROM tax_lines WHERE id = ?1")
                .bind(line.id())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(
            inserted = plan.to_insert.len(),
            updated = plan.to_update.len(),
            deleted = plan.to_delete.len(),
            "Applied tax reconciliation"
        );

        for line in plan
            .to_insert
            .iter_mut()
            .chain(plan.to_update.iter_mut())
            .chain(plan.to_delete.iter_mut())
        {
            line.mark_saved();
        }

        Ok(())
    }

    /// Removes every line of a parent document, e.g. when it is cancelled.
    pub async fn delete_for_parent(&self, parent_id: &str) -> DbResult<u64> {
        debug!(parent_id = %parent_id, "Deleting tax lines of parent");

        let result = sqlx::query("DELETE FROM tax_lines WHERE parent_id = ?1")
            .bind(parent_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
