//! # Repository Module
//!
//! Ledger store repositories. Every mutating method runs as ONE transaction
//! that also writes its audit rows; a returned error means nothing was written.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  let mut tx = pool.begin()                                              │
//! │       │                                                                 │
//! │       ├── read current state (status, versions)  ← fresh every attempt  │
//! │       ├── duka-core rule checks                  ← CoreError → rollback │
//! │       ├── inventory::reserve_and_deduct/restore  ← version precondition │
//! │       ├── row writes                                                    │
//! │       └── audit::append                          ← same transaction     │
//! │       │                                                                 │
//! │  tx.commit()                                                            │
//! │                                                                         │
//! │  Dropping `tx` on any `?` rolls everything back.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inside a transaction every query goes through `&mut *tx`. Helpers that
//! take part in a caller's transaction accept `&mut SqliteConnection`.
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Branch directory and product catalog
//! - [`InventoryRepository`](inventory::InventoryRepository) - Inventory Guard, restock, low stock
//! - [`SaleRepository`](sale::SaleRepository) - Sale Engine
//! - [`CreditRepository`](credit::CreditRepository) - Credit Ledger
//! - [`ReversalRepository`](reversal::ReversalRepository) - Reversal Workflow
//! - [`TransferRepository`](transfer::TransferRepository) - Transfer Workflow
//! - [`AuditRepository`](audit::AuditRepository) - Audit trail
//! - [`sequence`] - Receipt and transfer numbers

pub mod audit;
pub mod catalog;
pub mod credit;
pub mod inventory;
pub mod reversal;
pub mod sale;
pub mod sequence;
pub mod transfer;

use uuid::Uuid;

/// Generates a new primary key.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Test Fixtures
// =============================================================================

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use duka_core::{Actor, Branch, Money, Product, Role};

    use crate::{Database, DbConfig};

    pub const NAIROBI: &str = "branch-nairobi";
    pub const MOMBASA: &str = "branch-mombasa";
    pub const SUGAR: &str = "prod-sugar";
    pub const UNGA: &str = "prod-unga";

    pub fn cashier() -> Actor {
        Actor::new("user-cashier", Role::Cashier, Some(NAIROBI.to_string()))
    }

    pub fn manager() -> Actor {
        Actor::new("user-manager", Role::Manager, Some(NAIROBI.to_string()))
    }

    pub fn product(id: &str, name: &str, price: i64, min: i64, threshold: i64) -> Product {
        Product {
            id: id.to_string(),
            sku: id.to_uppercase(),
            name: name.to_string(),
            selling_price_cents: Money::from_major(price).cents(),
            min_price_cents: Money::from_major(min).cents(),
            low_stock_threshold: threshold,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Two branches, two products, no stock.
    pub async fn seeded() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();
        for (id, name) in [(NAIROBI, "Nairobi CBD"), (MOMBASA, "Mombasa Road")] {
            catalog
                .insert_branch(&Branch {
                    id: id.to_string(),
                    name: name.to_string(),
                    is_active: true,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        catalog
            .insert_product(&product(SUGAR, "Sugar 1kg", 180, 160, 5))
            .await
            .unwrap();
        catalog
            .insert_product(&product(UNGA, "Unga 2kg", 250, 220, 3))
            .await
            .unwrap();
        db
    }

    /// Seeded database with opening stock at Nairobi. Zero leaves no row.
    pub async fn stocked(sugar: i64, unga: i64) -> Database {
        let db = seeded().await;
        for (product_id, quantity) in [(SUGAR, sugar), (UNGA, unga)] {
            if quantity > 0 {
                db.inventory()
                    .restock(product_id, NAIROBI, quantity, &manager())
                    .await
                    .unwrap();
            }
        }
        db
    }
}
