//! # duka-db: Ledger Store for Duka
//!
//! SQLite storage for the transaction engine, built on sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Duka Data Flow                                   │
//! │                                                                         │
//! │  duka-engine (retry loop, events)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     duka-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ Inventory Guard│   │              │   │   │
//! │  │   │ SqlitePool    │◄───│ Sales, Credit  │   │ 001_initial  │   │   │
//! │  │   │ WAL, FKs on   │    │ Reversals      │   │              │   │   │
//! │  │   │               │    │ Transfers      │   │              │   │   │
//! │  │   └───────────────┘    │ Audit, Catalog │   └──────────────┘   │   │
//! │  │                        └────────────────┘                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (file, or :memory: in tests)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repositories, one transaction per mutation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use duka_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("data/duka.db")).await?;
//!
//! let receipt = db.sales().create_sale(&new_sale, &actor).await?;
//! let on_hand = db.inventory().quantity(&product_id, &branch_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

/// Tracing filter used by the seed binary and by `duka-engine` when
/// `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,duka=debug,sqlx=warn";

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::audit::AuditRepository;
pub use repository::catalog::CatalogRepository;
pub use repository::credit::{CreditRepository, CreditSettlement, OutstandingCredit};
pub use repository::inventory::{InventoryRepository, RestockOutcome, StockChange};
pub use repository::reversal::{ReversalOutcome, ReversalRepository};
pub use repository::sale::{SaleReceipt, SaleRepository};
pub use repository::transfer::{AutoCompletion, TransferOutcome, TransferRepository};
