//! # duka-core: Pure Business Logic for the Duka ledger
//!
//! Every rule that keeps stock, payments, debts and transfers consistent lives
//! here as a pure function. Storage and transactions are the job of `duka-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Duka Architecture                                │
//! │                                                                         │
//! │  HTTP API layer / notification layer (external)                        │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    duka-engine                                  │   │
//! │  │    retries, config, post-commit events                          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    duka-db                                      │   │
//! │  │    SQLite transactions, inventory guard, workflows              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ duka-core (THIS CRATE) ★                        │   │
//! │  │   money • types • sale • credit • inventory • transfer • audit  │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic
//! - [`types`] - Catalog, inventory, sale and payment types
//! - [`sale`] - Sale totals, payment reconciliation, credit classification
//! - [`credit`] - Credit balance formula and settlement status
//! - [`inventory`] - Low-stock rule
//! - [`transfer`] - Transfer state machine with explicit transition table
//! - [`audit`] - Audit trail vocabulary
//! - [`validation`] - Input validation run before any transaction starts
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use duka_core::money::Money;
//! use duka_core::credit::credit_balance;
//!
//! // 1000.00 total, 300.00 paid in cash, nothing settled yet
//! let balance = credit_balance(Money::from_cents(100_000), Money::from_cents(30_000), Money::zero());
//! assert_eq!(balance.cents(), 70_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod credit;
pub mod error;
pub mod inventory;
pub mod money;
pub mod sale;
pub mod transfer;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use audit::{AuditAction, AuditEntry, EntityType, NewAuditEntry, StockMovement, StockMovementType};
pub use error::{CoreError, CoreResult, ValidationError};
pub use inventory::LowStockItem;
pub use money::Money;
pub use sale::{NewSale, PaymentInput, SaleLineInput};
pub use transfer::{
    NewTransfer, ReceivedItem, Transfer, TransferDetail, TransferItem, TransferLineInput,
    TransferStatus, TransferTransition,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tolerance when reconciling payments against a sale total (0.01).
pub const PAYMENT_TOLERANCE: Money = Money::from_cents(1);

/// Tolerance for credit settlement: a balance below this is considered
/// settled, and a settlement may exceed the balance by at most this much (1.00).
pub const CREDIT_TOLERANCE: Money = Money::from_cents(100);

/// Maximum line items allowed in a single sale.
pub const MAX_SALE_ITEMS: usize = 200;

/// Maximum quantity of a single line or transfer item.
///
/// ## Business Reason
/// Prevents typing 10000 instead of 100 at a till.
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// Largest single amount accepted as a unit price, discount or payment
/// (100,000,000.00).
///
/// With [`MAX_SALE_ITEMS`] and [`MAX_ITEM_QUANTITY`] a sale subtotal stays
/// far inside `i64` cents.
pub const MAX_AMOUNT: Money = Money::from_cents(10_000_000_000);
