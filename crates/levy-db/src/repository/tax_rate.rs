//! # Tax Rate Repository
//!
//! Effective-dated rates. At most one rate per (type, effective date).
//! A stored rate keeps its type and percentage forever; only the effective
//! date may be corrected.

use sqlx::SqlitePool;
use tracing::debug;

use levy_core::validation::validate_tax_rate;
use levy_core::{CoreError, TaxRate};

use crate::error::{DbError, DbResult};

/// Repository for tax rate operations.
#[derive(Debug, Clone)]
pub struct TaxRateRepository {
    pool: SqlitePool,
}

impl TaxRateRepository {
    /// Creates a new TaxRateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TaxRateRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<TaxRate>> {
        let rate = sqlx::query_as::<_, TaxRate>(
            r#"
            SELECT id, type_id, rate, effective_from
            FROM tax_rates
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(rate)
    }

    /// All rates of a type, newest effective date first.
    pub async fn list_for_type(&self, type_id: &str) -> DbResult<Vec<TaxRate>> {
        let rates = sqlx::query_as::<_, TaxRate>(
            r#"
            SELECT id, type_id, rate, effective_from
            FROM tax_rates
            WHERE type_id = ?1
            ORDER BY effective_from DESC
            "#,
        )
        .bind(type_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(type_id = %type_id, count = rates.len(), "Loaded tax rates");
        Ok(rates)
    }

    /// The rate with the newest effective date, whatever the date today.
    pub async fn latest_for_type(&self, type_id: &str) -> DbResult<Option<TaxRate>> {
        let rate = sqlx::query_as::<_, TaxRate>(
            r#"
            SELECT id, type_id, rate, effective_from
            FROM tax_rates
            WHERE type_id = ?1
            ORDER BY effective_from DESC
            LIMIT 1
            "#,
        )
        .bind(type_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(rate)
    }

    /// Inserts a rate, or moves the effective date of a stored one.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - the type already has a rate on that date
    /// * `Err(DbError::Core(SetNotAllowed))` - type or percentage differs from the stored row
    pub async fn save(&self, rate: &mut TaxRate) -> DbResult<()> {
        validate_tax_rate(rate)?;

        match self.get_by_id(&rate.id).await? {
            Some(stored) => {
                if stored.type_id() != rate.type_id() {
                    return Err(CoreError::set_not_allowed("Type").into());
                }
                if stored.rate() != rate.rate() {
                    return Err(CoreError::set_not_allowed("Rate").into());
                }

                debug!(id = %rate.id, effective_from = %rate.effective_from, "Updating tax rate");
                sqlx::query("UPDATE tax_rates SET effective_from = ?2 WHERE id = ?1")
                    .bind(&rate.id)
                    .bind(rate.effective_from)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| Self::map_duplicate(e, rate))?;
            }
            None => {
                debug!(
                    type_id = %rate.type_id(),
                    rate = %rate.rate(),
                    effective_from = %rate.effective_from,
                    "Inserting tax rate"
                );
                sqlx::query(
                    r#"
                    INSERT INTO tax_rates (id, type_id, rate, effective_from)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                )
                .bind(&rate.id)
                .bind(rate.type_id())
                .bind(rate.rate())
                .bind(rate.effective_from)
                .execute(&self.pool)
                .await
                .map_err(|e| Self::map_duplicate(e, rate))?;
            }
        }

        rate.mark_persisted();
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting tax rate");

        let result = sqlx::query("DELETE FROM tax_rates WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TaxRate", id));
        }

        Ok(())
    }

    fn map_duplicate(err: sqlx::Error, rate: &TaxRate) -> DbError {
        match DbError::from(err) {
            DbError::UniqueViolation { .. } => {
                DbError::duplicate("effective_from", rate.effective_from.to_string())
            }
            other => other,
        }
    }
}
