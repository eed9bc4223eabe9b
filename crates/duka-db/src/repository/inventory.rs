//! # Inventory Guard
//!
//! Every change to an `inventory` row goes through [`reserve_and_deduct`] or
//! [`restore`] on the caller's transaction.
//!
//! ## Optimistic Locking
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. read_level(product, branch)          → quantity 12, version 7       │
//! │  2. reserve_and_deduct(…, qty 5, v7)                                    │
//! │       quantity < 5?        → InsufficientStock (terminal)               │
//! │       stored version ≠ 7?  → StaleVersion (retry with fresh read)       │
//! │       UPDATE … SET quantity = quantity − 5, version = version + 1       │
//! │              WHERE id = ? AND version = 7 AND quantity >= 5             │
//! │       0 rows?              → StaleVersion                               │
//! │  3. quantity 7, version 8                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The version check lives in the UPDATE itself, so a concurrent writer that
//! committed between read and write makes this write fail closed rather
//! than overwrite.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use duka_core::inventory::{ensure_available, resolve_threshold};
use duka_core::validation::validate_quantity;
use duka_core::{
    Actor, InventoryRecord, LowStockItem, Money, NewAuditEntry, StockLevel, StockMovement,
    StockMovementType,
};

use super::catalog::{require_active_branch, require_active_product};
use super::transfer::{self, AutoCompletion};
use super::{audit, new_id};
use crate::error::{DbError, DbResult};

// =============================================================================
// Guard Types
// =============================================================================

/// The `(product, branch)` row a guard call targets.
#[derive(Debug, Clone, Copy)]
pub struct StockTarget<'a> {
    pub product_id: &'a str,
    pub branch_id: &'a str,
    /// Used in InsufficientStock messages.
    pub product_name: &'a str,
}

/// Current level of a row as read inside the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentLevel {
    pub inventory_id: String,
    pub level: StockLevel,
    /// Branch threshold override, if set.
    pub low_stock_threshold: Option<i64>,
}

/// Outcome of one guarded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub inventory_id: String,
    pub product_id: String,
    pub branch_id: String,
    pub before: StockLevel,
    pub after: StockLevel,
    pub low_stock_threshold: Option<i64>,
}

impl StockChange {
    /// Stock movement for the audit trail.
    pub fn movement(&self, movement_type: StockMovementType, reference_id: Option<&str>) -> StockMovement {
        StockMovement {
            movement_type,
            product_id: self.product_id.clone(),
            branch_id: self.branch_id.clone(),
            delta: self.after.quantity - self.before.quantity,
            quantity_before: self.before.quantity,
            quantity_after: self.after.quantity,
            version_after: self.after.version,
            reference_id: reference_id.map(str::to_string),
        }
    }

    /// Writes the stock audit row for this change.
    pub async fn audit(
        &self,
        conn: &mut SqliteConnection,
        actor: &Actor,
        movement_type: StockMovementType,
        reference_id: Option<&str>,
    ) -> DbResult<()> {
        let movement = self.movement(movement_type, reference_id);
        audit::append(
            conn,
            &NewAuditEntry::stock(&actor.user_id, &self.inventory_id, &movement),
        )
        .await
    }
}

/// A restock and what it triggered.
#[derive(Debug, Clone)]
pub struct RestockOutcome {
    pub change: StockChange,
    /// Transfers completed by the closed-loop rule.
    pub auto_completed: Vec<AutoCompletion>,
}

// =============================================================================
// Guard Operations
// =============================================================================

/// Reads quantity and version of a row, if it exists.
pub async fn read_level(
    conn: &mut SqliteConnection,
    product_id: &str,
    branch_id: &str,
) -> DbResult<Option<CurrentLevel>> {
    let row: Option<(String, i64, i64, Option<i64>)> = sqlx::query_as(
        r#"
        SELECT id, quantity, version, low_stock_threshold
        FROM inventory
        WHERE product_id = ?1 AND branch_id = ?2
        "#,
    )
    .bind(product_id)
    .bind(branch_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(inventory_id, quantity, version, threshold)| CurrentLevel {
        inventory_id,
        level: StockLevel { quantity, version },
        low_stock_threshold: threshold,
    }))
}

/// Deducts `quantity` if the row still has `expected_version` and enough stock.
///
/// ## Errors
/// - `InsufficientStock` (terminal) when stock is short; a missing row has 0
/// - `StaleVersion` (retryable) when the row changed since it was read
///
/// `mark_sold` stamps `last_sold_at`.
pub async fn reserve_and_deduct(
    conn: &mut SqliteConnection,
    target: &StockTarget<'_>,
    quantity: i64,
    expected_version: i64,
    mark_sold: bool,
) -> DbResult<StockChange> {
    let current = read_level(conn, target.product_id, target.branch_id).await?;
    let Some(current) = current else {
        ensure_available(target.product_name, 0, quantity)?;
        return Err(DbError::stale("Inventory", target.product_id, expected_version));
    };

    ensure_available(target.product_name, current.level.quantity, quantity)?;
    if current.level.version != expected_version {
        return Err(DbError::stale("Inventory", &current.inventory_id, expected_version));
    }

    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE inventory SET
            quantity = quantity - ?3,
            version = version + 1,
            last_sold_at = CASE WHEN ?4 THEN ?5 ELSE last_sold_at END,
            updated_at = ?5
        WHERE id = ?1 AND version = ?2 AND quantity >= ?3
        "#,
    )
    .bind(&current.inventory_id)
    .bind(expected_version)
    .bind(quantity)
    .bind(mark_sold)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::stale("Inventory", &current.inventory_id, expected_version));
    }

    let after = StockLevel {
        quantity: current.level.quantity - quantity,
        version: expected_version + 1,
    };

    debug!(
        product_id = %target.product_id,
        branch_id = %target.branch_id,
        quantity,
        remaining = after.quantity,
        version = after.version,
        "Stock deducted"
    );

    Ok(StockChange {
        inventory_id: current.inventory_id,
        product_id: target.product_id.to_string(),
        branch_id: target.branch_id.to_string(),
        before: current.level,
        after,
        low_stock_threshold: current.low_stock_threshold,
    })
}

/// Adds `quantity` back to a row, creating it at version 1 if the branch
/// never stocked the product. No ceiling.
///
/// `restocked_at` stamps `last_restock_at`.
pub async fn restore(
    conn: &mut SqliteConnection,
    product_id: &str,
    branch_id: &str,
    quantity: i64,
    restocked_at: Option<DateTime<Utc>>,
) -> DbResult<StockChange> {
    let now = Utc::now();

    let Some(current) = read_level(conn, product_id, branch_id).await? else {
        let inventory_id = new_id();
        // A concurrent insert of the same row hits UNIQUE(product_id, branch_id),
        // which is retryable.
        sqlx::query(
            r#"
            INSERT INTO inventory (
                id, product_id, branch_id, quantity, version,
                last_restock_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?6)
            "#,
        )
        .bind(&inventory_id)
        .bind(product_id)
        .bind(branch_id)
        .bind(quantity)
        .bind(restocked_at)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        debug!(product_id, branch_id, quantity, "Inventory row created");

        return Ok(StockChange {
            inventory_id,
            product_id: product_id.to_string(),
            branch_id: branch_id.to_string(),
            before: StockLevel {
                quantity: 0,
                version: 0,
            },
            after: StockLevel {
                quantity,
                version: 1,
            },
            low_stock_threshold: None,
        });
    };

    let result = sqlx::query(
        r#"
        UPDATE inventory SET
            quantity = quantity + ?3,
            version = version + 1,
            last_restock_at = COALESCE(?4, last_restock_at),
            updated_at = ?5
        WHERE id = ?1 AND version = ?2
        "#,
    )
    .bind(&current.inventory_id)
    .bind(current.level.version)
    .bind(quantity)
    .bind(restocked_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::stale(
            "Inventory",
            &current.inventory_id,
            current.level.version,
        ));
    }

    debug!(product_id, branch_id, quantity, "Stock restored");

    Ok(StockChange {
        inventory_id: current.inventory_id,
        product_id: product_id.to_string(),
        branch_id: branch_id.to_string(),
        before: current.level,
        after: StockLevel {
            quantity: current.level.quantity + quantity,
            version: current.level.version + 1,
        },
        low_stock_threshold: current.low_stock_threshold,
    })
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for inventory reads, restock and branch overrides.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Gets the inventory row for a product at a branch.
    pub async fn get(&self, product_id: &str, branch_id: &str) -> DbResult<Option<InventoryRecord>> {
        let record = sqlx::query_as::<_, InventoryRecord>(
            r#"
            SELECT id, product_id, branch_id, quantity, version, selling_price_cents,
                   low_stock_threshold, last_restock_at, last_sold_at, created_at, updated_at
            FROM inventory
            WHERE product_id = ?1 AND branch_id = ?2
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Quantity on hand; 0 when the branch never stocked the product.
    pub async fn quantity(&self, product_id: &str, branch_id: &str) -> DbResult<i64> {
        Ok(self
            .get(product_id, branch_id)
            .await?
            .map(|r| r.quantity)
            .unwrap_or(0))
    }

    /// All inventory rows at a branch.
    pub async fn list_branch(&self, branch_id: &str) -> DbResult<Vec<InventoryRecord>> {
        let records = sqlx::query_as::<_, InventoryRecord>(
            r#"
            SELECT id, product_id, branch_id, quantity, version, selling_price_cents,
                   low_stock_threshold, last_restock_at, last_sold_at, created_at, updated_at
            FROM inventory
            WHERE branch_id = ?1
            ORDER BY product_id
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Active products at or below their threshold at a branch.
    pub async fn list_low_stock(&self, branch_id: &str) -> DbResult<Vec<LowStockItem>> {
        let items = sqlx::query_as::<_, LowStockItem>(
            r#"
            SELECT i.product_id, p.name AS product_name, i.branch_id, i.quantity,
                   COALESCE(i.low_stock_threshold, p.low_stock_threshold) AS threshold
            FROM inventory i
            JOIN products p ON p.id = i.product_id
            WHERE i.branch_id = ?1
              AND p.is_active = 1
              AND i.quantity <= COALESCE(i.low_stock_threshold, p.low_stock_threshold)
            ORDER BY i.quantity, p.name
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Sets branch-specific selling price and low-stock threshold.
    ///
    /// `None` clears an override so the product default applies.
    pub async fn set_branch_overrides(
        &self,
        product_id: &str,
        branch_id: &str,
        selling_price: Option<Money>,
        low_stock_threshold: Option<i64>,
    ) -> DbResult<InventoryRecord> {
        let mut tx = self.pool.begin().await?;
        require_active_product(&mut tx, product_id).await?;
        require_active_branch(&mut tx, branch_id).await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO inventory (
                id, product_id, branch_id, quantity, version,
                selling_price_cents, low_stock_threshold, created_at, updated_at
            ) VALUES (?1, ?2, ?3, 0, 1, ?4, ?5, ?6, ?6)
            ON CONFLICT (product_id, branch_id) DO UPDATE SET
                selling_price_cents = excluded.selling_price_cents,
                low_stock_threshold = excluded.low_stock_threshold,
                version = version + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(new_id())
        .bind(product_id)
        .bind(branch_id)
        .bind(selling_price.map(|m| m.cents()))
        .bind(low_stock_threshold)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let record = sqlx::query_as::<_, InventoryRecord>(
            r#"
            SELECT id, product_id, branch_id, quantity, version, selling_price_cents,
                   low_stock_threshold, last_restock_at, last_sold_at, created_at, updated_at
            FROM inventory
            WHERE product_id = ?1 AND branch_id = ?2
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Manual restock: adds stock, then completes matching pending transfers.
    ///
    /// ## Steps (one transaction)
    /// 1. Product and branch must be active
    /// 2. `restore` (upsert) with `last_restock_at = now`
    /// 3. `STOCK_RESTOCKED` audit row
    /// 4. Closed-loop rule: REQUESTED/APPROVED transfers from this branch that
    ///    carry this product become RECEIVED
    pub async fn restock(
        &self,
        product_id: &str,
        branch_id: &str,
        quantity: i64,
        actor: &Actor,
    ) -> DbResult<RestockOutcome> {
        validate_quantity(quantity)?;

        let mut tx = self.pool.begin().await?;
        require_active_product(&mut tx, product_id).await?;
        require_active_branch(&mut tx, branch_id).await?;

        let now = Utc::now();
        let change = restore(&mut tx, product_id, branch_id, quantity, Some(now)).await?;
        change
            .audit(&mut tx, actor, StockMovementType::Restock, None)
            .await?;

        let auto_completed =
            transfer::auto_complete_for_restock(&mut tx, branch_id, product_id, actor, now).await?;

        tx.commit().await?;

        info!(
            product_id,
            branch_id,
            quantity,
            on_hand = change.after.quantity,
            auto_completed = auto_completed.len(),
            "Restock committed"
        );

        Ok(RestockOutcome {
            change,
            auto_completed,
        })
    }
}

/// Threshold for a change, given the product default.
pub fn threshold_for(change: &StockChange, product_default: i64) -> i64 {
    resolve_threshold(change.low_stock_threshold, product_default)
}

// =============================================================================
// Unit Tests
// =============================================================================
