//! # Engine Error Type
//!
//! What callers of the engine see when an operation fails.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Duka                                   │
//! │                                                                         │
//! │  ValidationError ─────────────────────────────► EngineError::Validation │
//! │  (before any tx)                                                        │
//! │                                                                         │
//! │  DbError::Rule(CoreError) ────────────────────► EngineError::Rule       │
//! │  (tx rolled back)          *NotFound variants ► EngineError::NotFound   │
//! │                                                                         │
//! │  DbError::StaleVersion / Busy ── retried ──┬──► success                 │
//! │                                            └──► EngineError::Conflict   │
//! │                                                                         │
//! │  any other DbError ── error! logged ──────────► EngineError::Storage    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The HTTP layer maps [`ErrorResponse`] onto its wire format:
//! ```json
//! {
//!   "code": "INSUFFICIENT_STOCK",
//!   "message": "Insufficient stock for Unga 2kg: available 3, requested 5"
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use duka_core::{CoreError, ValidationError};
use duka_db::DbError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine operation failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input; nothing was attempted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A business rule rejected the operation; nothing was written.
    #[error(transparent)]
    Rule(CoreError),

    /// The addressed record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Concurrent writers kept winning; the caller may retry.
    #[error("{operation} conflicted with concurrent updates after {attempts} attempts")]
    Conflict { operation: String, attempts: u32 },

    /// The ledger store failed.
    #[error("Storage failure: {0}")]
    Storage(DbError),
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,

    /// Resource not found (404)
    NotFound,

    /// Insufficient stock (409)
    InsufficientStock,

    /// Payments, discount or settlement amounts do not add up (422)
    PaymentError,

    /// Unit price below the floor (422)
    BelowMinimumPrice,

    /// Workflow step not allowed from the current state (409)
    InvalidState,

    /// Any other business rule (422)
    BusinessLogic,

    /// Retries exhausted (409, retryable)
    Conflict,

    /// Storage failed (500)
    DatabaseError,
}

impl EngineError {
    /// Machine-readable code for the HTTP layer.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation(_) => ErrorCode::ValidationError,
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::Conflict { .. } => ErrorCode::Conflict,
            EngineError::Storage(_) => ErrorCode::DatabaseError,
            EngineError::Rule(rule) => match rule {
                CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
                CoreError::BelowMinimumPrice { .. } => ErrorCode::BelowMinimumPrice,
                CoreError::PaymentMismatch { .. }
                | CoreError::Overpayment { .. }
                | CoreError::DiscountExceedsSubtotal { .. } => ErrorCode::PaymentError,
                CoreError::InvalidStateTransition { .. } => ErrorCode::InvalidState,
                CoreError::Validation(_)
                | CoreError::MissingCreditCustomerInfo
                | CoreError::AmountOverflow { .. } => ErrorCode::ValidationError,
                _ => ErrorCode::BusinessLogic,
            },
        }
    }

    /// The business rule behind this error, if any.
    pub fn as_rule(&self) -> Option<&CoreError> {
        match self {
            EngineError::Rule(rule) => Some(rule),
            _ => None,
        }
    }

    /// True when repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => EngineError::not_found("Product", id),
            CoreError::BranchNotFound(id) => EngineError::not_found("Branch", id),
            CoreError::SaleNotFound(id) => EngineError::not_found("Sale", id),
            CoreError::TransferNotFound(id) => EngineError::not_found("Transfer", id),
            CoreError::Validation(e) => EngineError::Validation(e),
            other => EngineError::Rule(other),
        }
    }
}

/// Converts storage errors. Retryable errors reaching this point were not
/// retried (reads), so they surface as conflicts with one attempt.
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Rule(rule) => rule.into(),
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            err if err.is_retryable() => EngineError::Conflict {
                operation: "read".to_string(),
                attempts: 1,
            },
            other => {
                tracing::error!(error = %other, "Ledger store failure");
                EngineError::Storage(other)
            }
        }
    }
}

impl EngineError {
    fn not_found(entity: &str, id: String) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id,
        }
    }
}

/// Error payload for the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ErrorResponse {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        let message = match err {
            // Internal details stay in the logs.
            EngineError::Storage(_) => "Database operation failed".to_string(),
            other => other.to_string(),
        };
        ErrorResponse {
            code: err.code(),
            message,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
