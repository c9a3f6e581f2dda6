//! # Tax Type Repository
//!
//! Tax types belong to one region and one tax method for their whole life.
//!
//! ## Save Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  save(&mut tax_type)                                                    │
//! │                                                                         │
//! │  1. validate_tax_type (name, region, applicable period)                │
//! │  2. no method yet? ──► assign the "percentage" method record            │
//! │  3. row exists?                                                         │
//! │       ├── yes: stored region/method must match, else SetNotAllowed      │
//! │       │        UPDATE name, display order, applicable period            │
//! │       └── no:  INSERT                                                   │
//! │  4. mark_persisted                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use levy_core::method::PERCENTAGE;
use levy_core::validation::validate_tax_type;
use levy_core::{CoreError, TaxType};

use crate::error::{DbError, DbResult};

/// Repository for tax type operations.
#[derive(Debug, Clone)]
pub struct TaxTypeRepository {
    pool: SqlitePool,
}

impl TaxTypeRepository {
    /// Creates a new TaxTypeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TaxTypeRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<TaxType>> {
        let tax_type = sqlx::query_as::<_, TaxType>(
            r#"
            SELECT id, name, region_id, tax_method_id, display_order,
                   applicable_from, applicable_to
            FROM tax_types
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tax_type)
    }

    /// All types of a region in display order.
    pub async fn list_for_region(&self, region_id: &str) -> DbResult<Vec<TaxType>> {
        debug!(region_id = %region_id, "Loading tax types of region");

        let types = sqlx::query_as::<_, TaxType>(
            r#"
            SELECT id, name, region_id, tax_method_id, display_order,
                   applicable_from, applicable_to
            FROM tax_types
            WHERE region_id = ?1
            ORDER BY display_order, name
            "#,
        )
        .bind(region_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(types)
    }

    /// Inserts or updates a tax type.
    ///
    /// ## Returns
    /// * `Err(DbError::Core(SetNotAllowed))` - region or method differs from the stored row
    /// * `Err(DbError::ForeignKeyViolation)` - region or method does not exist
    pub async fn save(&self, tax_type: &mut TaxType) -> DbResult<()> {
        validate_tax_type(tax_type)?;

        if tax_type.tax_method_id().is_none() && tax_type.is_new() {
            let method_id: Option<String> =
                sqlx::query_scalar("SELECT id FROM tax_methods WHERE kind = ?1")
                    .bind(PERCENTAGE)
                    .fetch_optional(&self.pool)
                    .await?;
            let method_id = method_id.ok_or_else(|| DbError::not_found("TaxMethod", PERCENTAGE))?;
            tax_type.set_tax_method(method_id)?;
        }

        match self.get_by_id(&tax_type.id).await? {
            Some(stored) => {
                if stored.region_id() != tax_type.region_id() {
                    return Err(CoreError::set_not_allowed("Region").into());
                }
                if stored.tax_method_id() != tax_type.tax_method_id() {
                    return Err(CoreError::set_not_allowed("Tax Method").into());
                }

                debug!(id = %tax_type.id, "Updating tax type");
                sqlx::query(
                    r#"
                    UPDATE tax_types SET
                        name = ?2,
                        display_order = ?3,
                        applicable_from = ?4,
                        applicable_to = ?5
                    WHERE id = ?1
                    "#,
                )
                .bind(&tax_type.id)
                .bind(&tax_type.name)
                .bind(tax_type.display_order)
                .bind(tax_type.applicable_from)
                .bind(tax_type.applicable_to)
                .execute(&self.pool)
                .await?;
            }
            None => {
                debug!(id = %tax_type.id, name = %tax_type.name, "Inserting tax type");
                sqlx::query(
                    r#"
                    INSERT INTO tax_types (
                        id, name, region_id, tax_method_id, display_order,
                        applicable_from, applicable_to
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                )
                .bind(&tax_type.id)
                .bind(&tax_type.name)
                .bind(tax_type.region_id())
                .bind(tax_type.tax_method_id())
                .bind(tax_type.display_order)
                .bind(tax_type.applicable_from)
                .bind(tax_type.applicable_to)
                .execute(&self.pool)
                .await?;
            }
        }

        tax_type.mark_persisted();
        Ok(())
    }

    /// Deletes a type together with its rates and definitions.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting tax type");

        let result = sqlx::query("DELETE FROM tax_types WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TaxType", id));
        }

        Ok(())
    }
}
