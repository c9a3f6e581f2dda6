//! # Seed Data
//!
//! Rows the engine relies on being present. Runs after migrations.

use sqlx::SqlitePool;
use tracing::{debug, info};

use levy_core::method::BUILTIN_METHODS;
use levy_core::TaxMethodRecord;

use crate::error::DbResult;

/// Creates any missing built-in tax method record (one per kind).
///
/// Idempotent: existing records, including their fixed amounts, are left
/// untouched. Returns the number of records created.
pub async fn ensure_tax_methods(pool: &SqlitePool) -> DbResult<u64> {
    let mut created = 0;

    for (name, kind) in BUILTIN_METHODS {
        let record = TaxMethodRecord::new(*name, *kind);
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO tax_methods (id, name, kind, fixed_amount_minor)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.kind)
        .bind(record.fixed_amount_minor)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(kind = %kind, "Created built-in tax method");
        }
        created += result.rows_affected();
    }

    if created > 0 {
        info!(created, "Seeded built-in tax methods");
    }
    Ok(created)
}
