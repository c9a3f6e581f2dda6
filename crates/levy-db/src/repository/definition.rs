//! # Tax Definition Repository
//!
//! Maps an item tax category within a region to the tax types it pays.
//!
//! ## Applicable Types Lookup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  list_types(category = "1", region = UAE, date = 2023-06-01)            │
//! │                                                                         │
//! │  tax_definitions d                    tax_types t                       │
//! │  ┌──────────┬────────┬────────┐       ┌────────┬───────┬────────────┐   │
//! │  │ category │ region │ type   │──────►│ id     │ order │ applicable │   │
//! │  ├──────────┼────────┼────────┤       ├────────┼───────┼────────────┤   │
//! │  │ 1        │ UAE    │ vat    │       │ vat    │ 1     │ 2000..2999 │ ✓ │
//! │  │ 1        │ UAE    │ excise │       │ excise │ 2     │ 2000..2999 │ ✓ │
//! │  │ 1        │ UAE    │ tour   │       │ tour   │ 3     │ 2024..2999 │ ✗ │
//! │  │ 2        │ UAE    │ vat    │       │        │       │            │   │
//! │  └──────────┴────────┴────────┘       └────────┴───────┴────────────┘   │
//! │                                                                         │
//! │  Result: [vat, excise] ordered by display order                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::debug;

use levy_core::validation::validate_tax_definition;
use levy_core::{CoreError, TaxDefinition, TaxType, ValidationError};

use crate::error::{DbError, DbResult};

/// Repository for tax definition operations.
#[derive(Debug, Clone)]
pub struct DefinitionRepository {
    pool: SqlitePool,
}

impl DefinitionRepository {
    /// Creates a new DefinitionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DefinitionRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<TaxDefinition>> {
        let definition = sqlx::query_as::<_, TaxDefinition>(
            "SELECT id, category, region_id, type_id FROM tax_definitions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(definition)
    }

    /// Definitions of a category in a region.
    pub async fn list_for_category(
        &self,
        category: &str,
        region_id: &str,
    ) -> DbResult<Vec<TaxDefinition>> {
        let definitions = sqlx::query_as::<_, TaxDefinition>(
            r#"
            SELECT id, category, region_id, type_id
            FROM tax_definitions
            WHERE category = ?1 AND region_id = ?2
            "#,
        )
        .bind(category)
        .bind(region_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(definitions)
    }

    /// Tax types applicable to `category` in `region_id` on `date`, in
    /// display order.
    pub async fn list_types(
        &self,
        category: &str,
        region_id: &str,
        date: NaiveDate,
    ) -> DbResult<Vec<TaxType>> {
        let types = sqlx::query_as::<_, TaxType>(
            r#"
            SELECT t.id, t.name, t.region_id, t.tax_method_id, t.display_order,
                   t.applicable_from, t.applicable_to
            FROM tax_definitions d
            INNER JOIN tax_types t ON t.id = d.type_id
            WHERE d.category = ?1
              AND d.region_id = ?2
              AND t.applicable_from <= ?3
              AND t.applicable_to >= ?3
            ORDER BY t.display_order, t.name
            "#,
        )
        .bind(category)
        .bind(region_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        debug!(
            category = %category,
            region_id = %region_id,
            %date,
            count = types.len(),
            "Listed applicable tax types"
        );
        Ok(types)
    }

    /// Fails if another definition already maps the category to the type.
    pub async fn check_for_duplicate(&self, definition: &TaxDefinition) -> DbResult<()> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM tax_definitions
            WHERE category = ?1 AND type_id = ?2 AND id <> ?3
            "#,
        )
        .bind(&definition.category)
        .bind(&definition.type_id)
        .bind(&definition.id)
        .fetch_one(&self.pool)
        .await?;

        if count > 0 {
            return Err(ValidationError::Duplicate {
                field: "Type".to_string(),
                value: definition.type_id.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Inserts or updates a definition.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - the type does not exist
    /// * `Err(DbError::Core(InvalidValue))` - the type belongs to another region
    /// * `Err(DbError::Core(Validation(Duplicate)))` - category already maps to the type
    pub async fn save(&self, definition: &TaxDefinition) -> DbResult<()> {
        validate_tax_definition(definition)?;

        let type_region: Option<String> =
            sqlx::query_scalar("SELECT region_id FROM tax_types WHERE id = ?1")
                .bind(&definition.type_id)
                .fetch_optional(&self.pool)
                .await?;
        let type_region =
            type_region.ok_or_else(|| DbError::not_found("TaxType", &definition.type_id))?;
        if type_region != definition.region_id {
            return Err(CoreError::invalid_value("Type").into());
        }

        self.check_for_duplicate(definition).await?;

        debug!(
            category = %definition.category,
            type_id = %definition.type_id,
            "Saving tax definition"
        );
        sqlx::query(
            r#"
            INSERT INTO tax_definitions (id, category, region_id, type_id)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                category = excluded.category,
                region_id = excluded.region_id,
                type_id = excluded.type_id
            "#,
        )
        .bind(&definition.id)
        .bind(&definition.category)
        .bind(&definition.region_id)
        .bind(&definition.type_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM tax_definitions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TaxDefinition", id));
        }

        Ok(())
    }
}
