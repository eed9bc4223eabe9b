//! # Domain Types
//!
//! Catalog, inventory, sale and payment types shared by every layer.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Read-only collaborators        Ledger rows                             │
//! │  ───────────────────────        ──────────────────────────────────      │
//! │  Branch (id, name, active)      InventoryRecord (product × branch)      │
//! │  Product (minPrice, threshold)  Sale ─┬─ SaleItem*                      │
//! │  Actor (user, role, branch)           ├─ Payment* (CASH/MPESA/CREDIT)   │
//! │                                       └─ CreditPayment* (append-only)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Row structs keep money as `*_cents: i64` so they map 1:1 onto columns;
//! accessors hand out [`Money`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Caller Identity
// =============================================================================

/// Role of the authenticated caller, as asserted by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Cashier,
    Manager,
    Admin,
    Overseer,
}

/// The authenticated caller. Injected by the auth layer; this core records
/// it in the audit trail and leaves authorization to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    /// Home branch of the caller; overseers may have none.
    pub branch_id: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role, branch_id: Option<String>) -> Self {
        Actor {
            user_id: user_id.into(),
            role,
            branch_id,
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A physical retail location with its own inventory.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A product from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    /// Default selling price, overridable per branch.
    pub selling_price_cents: i64,
    /// Price floor; no sale line may go below it.
    pub min_price_cents: i64,
    /// Default low-stock threshold, overridable per branch.
    pub low_stock_threshold: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn min_price(&self) -> Money {
        Money::from_cents(self.min_price_cents)
    }

    #[inline]
    pub fn selling_price(&self) -> Money {
        Money::from_cents(self.selling_price_cents)
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// Stock of one product at one branch. `(product_id, branch_id)` is unique.
///
/// `version` increases by one on every update; writers must present the
/// version they read or the update is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryRecord {
    pub id: String,
    pub product_id: String,
    pub branch_id: String,
    pub quantity: i64,
    pub version: i64,
    /// Branch-specific selling price overriding the product default.
    pub selling_price_cents: Option<i64>,
    /// Branch-specific threshold overriding the product default.
    pub low_stock_threshold: Option<i64>,
    #[ts(as = "Option<String>")]
    pub last_restock_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub last_sold_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Quantity and version of an inventory row after a guarded update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockLevel {
    pub quantity: i64,
    pub version: i64,
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    /// Mobile money, confirmed by the external payment source.
    Mpesa,
    /// Deferred as customer debt; records the debt, not money received.
    Credit,
}

impl PaymentMethod {
    /// True for methods that represent money actually received.
    #[inline]
    pub const fn is_money_received(&self) -> bool {
        !matches!(self, PaymentMethod::Credit)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Mpesa => "MPESA",
            PaymentMethod::Credit => "CREDIT",
        }
    }
}

// =============================================================================
// Credit / Reversal Status
// =============================================================================

/// Settlement state of a credit sale. Non-credit sales have none.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditStatus {
    /// Whole total deferred, nothing received yet.
    Pending,
    /// Part of the total received.
    Partial,
    /// Balance below the settlement tolerance.
    Paid,
}

impl CreditStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CreditStatus::Pending => "PENDING",
            CreditStatus::Partial => "PARTIAL",
            CreditStatus::Paid => "PAID",
        }
    }
}

/// Reversal workflow state: `NONE → PENDING → {APPROVED | REJECTED}`.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReversalStatus {
    #[default]
    None,
    Pending,
    Approved,
    Rejected,
}

impl ReversalStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReversalStatus::None => "NONE",
            ReversalStatus::Pending => "PENDING",
            ReversalStatus::Approved => "APPROVED",
            ReversalStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for ReversalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome chosen by the approver of a pending reversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReversalDecision {
    Approved,
    Rejected,
}

impl ReversalDecision {
    pub const fn status(&self) -> ReversalStatus {
        match self {
            ReversalDecision::Approved => ReversalStatus::Approved,
            ReversalDecision::Rejected => ReversalStatus::Rejected,
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale. Core fields never change after creation; only credit
/// settlement and the reversal decision touch the row afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub receipt_number: String,
    pub branch_id: String,
    pub user_id: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub is_credit: bool,
    pub credit_status: Option<CreditStatus>,
    pub is_reversed: bool,
    pub reversal_status: ReversalStatus,
    pub reversal_reason: Option<String>,
    pub reversal_requested_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub reversal_requested_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub reversed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub reversed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line of a sale. Product name is frozen at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    /// Input order within the sale.
    pub position: i64,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

/// A payment recorded with the sale (split tender allowed).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    /// External reference (M-Pesa confirmation code, etc.).
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// A later settlement against a credit sale. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CreditPayment {
    pub id: String,
    pub sale_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub received_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl CreditPayment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// A sale with everything it owns, as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDetail {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub payments: Vec<Payment>,
    pub credit_payments: Vec<CreditPayment>,
    /// Outstanding debt; zero for non-credit sales.
    pub balance: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================
