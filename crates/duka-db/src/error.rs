//! # Database Error Types
//!
//! Error types for ledger store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)         Business rule (CoreError)          │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  DbError (this module) ← categorised; Rule(..) rolls the tx back       │
//! │       │                                                                 │
//! │       ├── StaleVersion / Busy / document-number collision → retried     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError (duka-engine) ← code + message for the caller             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use duka_core::{CoreError, ValidationError};
use thiserror::Error;

/// SQLite primary result codes that mean "try again".
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Ledger store errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - ID doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate SKU
    /// - Duplicate receipt or transfer number
    /// - Two writers creating the same (product, branch) inventory row
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// An inventory row changed between read and write.
    ///
    /// ## When This Occurs
    /// ```text
    /// Till A reads Sugar@B1 v7 ──┐
    /// Till B reads Sugar@B1 v7 ──┤
    /// Till A writes WHERE v=7 ✓  │  → v8
    /// Till B writes WHERE v=7 ✗ ─┘  → StaleVersion, re-read and retry
    /// ```
    #[error("{entity} {id} changed concurrently (expected version {expected})")]
    StaleVersion {
        entity: String,
        id: String,
        expected: i64,
    },

    /// SQLite reported the database busy or locked.
    #[error("Database busy: {0}")]
    Busy(String),

    /// A business rule rejected the operation; the transaction was rolled back.
    #[error(transparent)]
    Rule(#[from] CoreError),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a StaleVersion error for an inventory row.
    pub fn stale(entity: impl Into<String>, id: impl Into<String>, expected: i64) -> Self {
        DbError::StaleVersion {
            entity: entity.into(),
            id: id.into(),
            expected,
        }
    }

    /// True for failures a fresh attempt with fresh reads can fix.
    ///
    /// ## Retryable
    /// - `StaleVersion`: another writer bumped the row version
    /// - `Busy`: SQLite lock contention
    /// - `UniqueViolation` on a document number or inventory key: a
    ///   concurrent writer got there first
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::StaleVersion { .. } | DbError::Busy(_) | DbError::PoolExhausted => true,
            DbError::UniqueViolation { field, .. } => {
                field.contains("receipt_number")
                    || field.contains("transfer_number")
                    || field.contains("inventory.")
                    || field.contains("sequences.")
            }
            _ => false,
        }
    }

    /// The business rule behind this error, if any.
    pub fn as_rule(&self) -> Option<&CoreError> {
        match self {
            DbError::Rule(rule) => Some(rule),
            _ => None,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Rule(CoreError::Validation(err))
    }
}

fn is_busy_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → code 5/6 → Busy; else analyse message
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                if is_busy_code(db_err.code().as_deref()) || msg.contains("database is locked") {
                    DbError::Busy(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    // "UNIQUE constraint failed: <table>.<column>[, <table>.<column>]"
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================
