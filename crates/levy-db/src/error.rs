//! # Database Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error ───────────► DbError ◄──────────── CoreError (levy-core)   │
//! │  constraint kind → variant          write-once fields, validation,      │
//! │                                     unknown method, missing FX rate     │
//! │                                                                         │
//! │  TaxEngine returns DbError; rate lookups never fail and log instead    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use levy_core::{CoreError, ValidationError};
use sqlx::error::ErrorKind;
use thiserror::Error;

/// Errors from the storage layer and the engine on top of it.
#[derive(Debug, Error)]
pub enum DbError {
    /// A row the operation depends on is missing.
    ///
    /// ## When This Occurs
    /// - Deleting or updating an id that is not stored
    /// - A definition naming a tax type that does not exist
    /// - A recomputed tax line deleted by someone else before `apply`
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the row.
    ///
    /// ## When This Occurs
    /// - Two rates for one tax type with the same effective date
    /// - A second method record for an existing kind
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// A referenced region, type or method does not exist, or a referenced
    /// row is still in use.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A CHECK constraint rejected the row (rate range, applicable period).
    #[error("Check constraint failed: {message}")]
    CheckViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// BEGIN or COMMIT failed; nothing of the plan was written.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Configuration could not be read or is inconsistent.
    ///
    /// ## When This Occurs
    /// - Unreadable or malformed `levy.toml`
    /// - Unknown default region policy or currency code
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal database error: {0}")]
    Internal(String),

    /// A domain rule rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Classifies sqlx errors by constraint kind.
///
/// SQLite reports `UNIQUE constraint failed: tax_rates.type_id,
/// tax_rates.effective_from`; the column list becomes `field`. Repositories
/// that know the offending value replace the error with
/// [`DbError::duplicate`].
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    ErrorKind::UniqueViolation => DbError::UniqueViolation {
                        field: message
                            .split_once(": ")
                            .map_or("unknown", |(_, columns)| columns)
                            .to_string(),
                        value: "unknown".to_string(),
                    },
                    ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { message },
                    ErrorKind::CheckViolation => DbError::CheckViolation { message },
                    _ => DbError::QueryFailed(message),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Core(CoreError::Validation(err))
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::InvalidConfig(err.to_string())
    }
}

impl From<toml::de::Error> for DbError {
    fn from(err: toml::de::Error) -> Self {
        DbError::InvalidConfig(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[test]
    fn test_helpers() {
        let err = DbError::not_found("TaxType", "vat");
        assert_eq!(err.to_string(), "TaxType not found: vat");

        let err = DbError::duplicate("effective_from", "2023-01-01");
        assert_eq!(err.to_string(), "Duplicate effective_from: '2023-01-01' already exists");
    }

    #[test]
    fn test_core_errors_pass_through() {
        let err: DbError = CoreError::set_not_allowed("Rate").into();
        assert_eq!(err.to_string(), "Change not allowed: Rate");

        let err: DbError = ValidationError::Required {
            field: "name".to_string(),
        }
        .into();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));
    }

    #[test]
    fn test_pool_errors() {
        assert!(matches!(DbError::from(sqlx::Error::RowNotFound), DbError::NotFound { .. }));
        assert!(matches!(DbError::from(sqlx::Error::PoolTimedOut), DbError::PoolExhausted));
        assert!(matches!(
            DbError::from(sqlx::Error::PoolClosed),
            DbError::ConnectionFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_constraint_kinds() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let err: DbError = sqlx::query(
            "INSERT INTO tax_methods (id, name, kind, fixed_amount_minor) VALUES ('x', 'Again', 'percentage', 0)",
        )
        .execute(db.pool())
        .await
        .unwrap_err()
        .into();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "tax_methods.kind"));

        let err: DbError = sqlx::query(
            "INSERT INTO tax_types (id, name, region_id, display_order, applicable_from, applicable_to) \
             VALUES ('t', 'VAT', 'nowhere', 0, '2000-01-01', '2999-12-31')",
        )
        .execute(db.pool())
        .await
        .unwrap_err()
        .into();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
