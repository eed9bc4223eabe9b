//! # Error Types
//!
//! Domain-specific error types for duka-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  duka-core errors (this file)                                          │
//! │  ├── ValidationError  - Malformed input, rejected before any tx        │
//! │  └── CoreError        - Business rule violations, tx rolled back       │
//! │                                                                         │
//! │  duka-db errors                                                        │
//! │  └── DbError          - Storage failures, stale versions               │
//! │                                                                         │
//! │  duka-engine errors                                                    │
//! │  └── EngineError      - What callers see (code + message)              │
//! │                                                                         │
//! │  Flow: ValidationError/CoreError → DbError → EngineError → caller      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every business rule variant carries enough detail (product name, amounts)
//! for a cashier to correct the input and retry without calling support.

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
///
/// Raised inside a transaction; the transaction is rolled back entirely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Product id is not in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product exists but has been deactivated.
    #[error("Product {name} is inactive and cannot be sold or moved")]
    ProductInactive { product_id: String, name: String },

    /// Branch id is not in the directory.
    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    /// Branch exists but is closed.
    #[error("Branch {name} is inactive")]
    BranchInactive { branch_id: String, name: String },

    /// Unit price below the product's price floor.
    #[error("Price {unit_price} for {product} is below the minimum price {min_price}")]
    BelowMinimumPrice {
        product: String,
        unit_price: Money,
        min_price: Money,
    },

    /// Not enough stock to complete a sale or dispatch.
    ///
    /// ## User Workflow
    /// ```text
    /// Sell 5 × Unga 2kg
    ///      │
    ///      ▼
    /// Inventory at branch: 3
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Unga 2kg", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Till shows: "Only 3 Unga 2kg in stock"
    /// ```
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Payments do not add up to the sale total.
    #[error("Payments total {paid} but sale total is {total} (difference {difference})")]
    PaymentMismatch {
        total: Money,
        paid: Money,
        difference: Money,
    },

    /// A computed amount (line total, subtotal, payment sum) does not fit.
    #[error("{what} is too large to compute")]
    AmountOverflow { what: String },

    /// Credit sale without a customer to chase.
    #[error("Credit sales require customer name and phone")]
    MissingCreditCustomerInfo,

    /// Discount larger than the subtotal.
    #[error("Discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: Money, subtotal: Money },

    /// A workflow step was attempted from a state that does not allow it.
    #[error("{entity} {id} is {current}, cannot {action}")]
    InvalidStateTransition {
        entity: String,
        id: String,
        current: String,
        action: String,
    },

    /// Sale id does not exist.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Settlement attempted against a sale that carries no debt.
    #[error("Sale {0} is not a credit sale")]
    NotCreditSale(String),

    /// Settlement exceeds what is owed.
    #[error("Payment {amount} exceeds outstanding balance {balance}")]
    Overpayment { amount: Money, balance: Money },

    /// Transfer id does not exist.
    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    /// Approval larger than the request.
    #[error("Cannot approve {approved} of {product_id}: only {requested} requested")]
    ApprovedExceedsRequested {
        product_id: String,
        requested: i64,
        approved: i64,
    },

    /// Approval or receipt references a product the transfer does not carry.
    #[error("Product {product_id} is not part of transfer {transfer_id}")]
    UnknownTransferItem {
        transfer_id: String,
        product_id: String,
    },

    /// Received quantities differ from dispatched ones and nobody explained why.
    #[error("Received quantities differ from dispatched quantities; discrepancy notes are required")]
    MissingDiscrepancyNotes,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Shorthand for [`CoreError::InvalidStateTransition`].
    pub fn invalid_transition(
        entity: impl Into<String>,
        id: impl Into<String>,
        current: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        CoreError::InvalidStateTransition {
            entity: entity.into(),
            id: id.into(),
            current: current.into(),
            action: action.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input is malformed or incomplete.
/// They are raised before any transaction is opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} cannot be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid phone).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Same value listed twice where it must be unique.
    #[error("{field} '{value}' is listed more than once")]
    Duplicate { field: String, value: String },

    /// Two fields that must differ are equal.
    #[error("{field} must differ from {other}")]
    MustDiffer { field: String, other: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
