//! # Tax Method Repository
//!
//! Persisted tax method records. The strategy behind a record is built by
//! the engine's `MethodRegistry` from its `kind`.

use sqlx::SqlitePool;
use tracing::debug;

use levy_core::validation::validate_tax_method;
use levy_core::TaxMethodRecord;

use crate::error::DbResult;

/// Repository for tax method records.
#[derive(Debug, Clone)]
pub struct TaxMethodRepository {
    pool: SqlitePool,
}

impl TaxMethodRepository {
    /// Creates a new TaxMethodRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TaxMethodRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<TaxMethodRecord>> {
        let method = sqlx::query_as::<_, TaxMethodRecord>(
            "SELECT id, name, kind, fixed_amount_minor FROM tax_methods WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(method)
    }

    pub async fn get_by_kind(&self, kind: &str) -> DbResult<Option<TaxMethodRecord>> {
        let method = sqlx::query_as::<_, TaxMethodRecord>(
            "SELECT id, name, kind, fixed_amount_minor FROM tax_methods WHERE kind = ?1",
        )
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(method)
    }

    pub async fn list(&self) -> DbResult<Vec<TaxMethodRecord>> {
        let methods = sqlx::query_as::<_, TaxMethodRecord>(
            "SELECT id, name, kind, fixed_amount_minor FROM tax_methods ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(methods)
    }

    /// Inserts or updates a method record. A second record for an existing
    /// kind fails with `UniqueViolation`.
    pub async fn save(&self, method: &TaxMethodRecord) -> DbResult<()> {
        validate_tax_method(method)?;
        debug!(id = %method.id, kind = %method.kind, "Saving tax method");

        sqlx::query(
            r#"
            INSERT INTO tax_methods (id, name, kind, fixed_amount_minor)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                fixed_amount_minor = excluded.fixed_amount_minor
            "#,
        )
        .bind(&method.id)
        .bind(&method.name)
        .bind(&method.kind)
        .bind(method.fixed_amount_minor)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::fixtures::database;
    use crate::DbError;
    use levy_core::TaxMethodRecord;

    #[tokio::test]
    async fn test_one_record_per_kind() {
        let db = database().await;
        let second = TaxMethodRecord::new("Another Percentage", "percentage");
        let err = db.tax_methods().save(&second).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_update_fixed_amount() {
        let db = database().await;
        let mut fixed = db.tax_methods().get_by_kind("fixed_tax").await.unwrap().unwrap();
        fixed.fixed_amount_minor = 250;
        db.tax_methods().save(&fixed).await.unwrap();

        let loaded = db.tax_methods().get_by_id(&fixed.id).await.unwrap().unwrap();
        assert_eq!(loaded.fixed_amount_minor, 250);
    }

    #[tokio::test]
    async fn test_custom_kind_can_be_stored() {
        let db = database().await;
        let slab = TaxMethodRecord::new("Slab", "slab");
        db.tax_methods().save(&slab).await.unwrap();
        assert_eq!(db.tax_methods().list().await.unwrap().len(), 4);
    }
}
