//! # Region Repository
//!
//! Tax regions. The default region is the first active region in insertion
//! order.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use levy_core::validation::validate_region;
use levy_core::TaxRegion;

use crate::error::{DbError, DbResult};

/// Repository for tax region operations.
#[derive(Debug, Clone)]
pub struct RegionRepository {
    pool: SqlitePool,
}

impl RegionRepository {
    /// Creates a new RegionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RegionRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<TaxRegion>> {
        let region = sqlx::query_as::<_, TaxRegion>(
            r#"
            SELECT id, name, active, created_at, updated_at
            FROM tax_regions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(region)
    }

    /// Lists all regions in insertion order.
    pub async fn list(&self) -> DbResult<Vec<TaxRegion>> {
        let regions = sqlx::query_as::<_, TaxRegion>(
            r#"
            SELECT id, name, active, created_at, updated_at
            FROM tax_regions
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(regions)
    }

    /// The first active region, if any.
    pub async fn first_active(&self) -> DbResult<Option<TaxRegion>> {
        let region = sqlx::query_as::<_, TaxRegion>(
            r#"
            SELECT id, name, active, created_at, updated_at
            FROM tax_regions
            WHERE active = 1
            ORDER BY rowid
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        debug!(found = region.is_some(), "Loaded default region");
        Ok(region)
    }

    /// Inserts the region, or updates name and active flag of an existing one.
    ///
    /// An update keeps the original rowid, so saving never changes which
    /// region is the default.
    pub async fn save(&self, region: &TaxRegion) -> DbResult<()> {
        validate_region(region)?;
        debug!(id = %region.id, name = %region.name, "Saving tax region");

        sqlx::query(
            r#"
            INSERT INTO tax_regions (id, name, active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                active = excluded.active,
                updated_at = ?6
            "#,
        )
        .bind(&region.id)
        .bind(&region.name)
        .bind(region.active)
        .bind(region.created_at)
        .bind(region.updated_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes a region. Fails with a foreign key violation while tax types
    /// still reference it.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting tax region");

        let result = sqlx::query("DELETE FROM tax_regions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TaxRegion", id));
        }

        Ok(())
    }
}
