//! # Sale Repository
//!
//! The storage half of the Sale Engine.
//!
//! ## Sale Creation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     create_sale (one transaction)                       │
//! │                                                                         │
//! │  1. branch must be active                                               │
//! │  2. per line, in input order:                                           │
//! │     ├── product must be active                                          │
//! │     ├── unit_price >= min_price                                         │
//! │     └── inventory::reserve_and_deduct(version read in this tx)          │
//! │  3. totals → payment reconciliation → credit classification             │
//! │  4. receipt number from the per-day sequence                            │
//! │  5. INSERT sales, sale_items, payments                                  │
//! │  6. audit: SALE_CREATED + one STOCK_DEDUCTED per line                   │
//! │  7. COMMIT                                                              │
//! │                                                                         │
//! │  Any error before 7 drops the transaction: nothing is written.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two lines for the same product run one after the other against the same
//! version chain: the second line reads the version the first one wrote.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use duka_core::credit::{credit_balance, received_at_sale};
use duka_core::inventory::low_stock_check;
use duka_core::sale::{check_price_floor, classify_credit, compute_totals, line_total, reconcile_payments};
use duka_core::{
    Actor, AuditAction, CoreError, CreditPayment, EntityType, LowStockItem, Money, NewAuditEntry,
    NewSale, Payment, ReversalStatus, Sale, SaleDetail, SaleItem, StockMovementType,
};

use super::catalog::{require_active_branch, require_active_product};
use super::inventory::{read_level, reserve_and_deduct, threshold_for, StockChange, StockTarget};
use super::sequence::{next_number, DocumentKind};
use super::{audit, new_id};
use crate::error::DbResult;

/// A committed sale and the stock it moved.
#[derive(Debug, Clone)]
pub struct SaleReceipt {
    pub detail: SaleDetail,
    /// One entry per line, in input order.
    pub stock: Vec<StockChange>,
    /// Products at or below their threshold after this sale.
    pub low_stock: Vec<LowStockItem>,
}

/// Repository for sales.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Creates a sale with its items and payments, deducting stock.
    ///
    /// Input shape is checked by `validate_new_sale` before this is called.
    pub async fn create_sale(&self, new_sale: &NewSale, actor: &Actor) -> DbResult<SaleReceipt> {
        let mut tx = self.pool.begin().await?;
        require_active_branch(&mut tx, &new_sale.branch_id).await?;

        let sale_id = new_id();
        let now = Utc::now();

        let mut items = Vec::with_capacity(new_sale.items.len());
        let mut stock = Vec::with_capacity(new_sale.items.len());
        let mut low_stock: BTreeMap<String, LowStockItem> = BTreeMap::new();

        for (position, line) in new_sale.items.iter().enumerate() {
            let product = require_active_product(&mut tx, &line.product_id).await?;
            check_price_floor(&product.name, line.unit_price, product.min_price())?;

            let expected_version = read_level(&mut tx, &product.id, &new_sale.branch_id)
                .await?
                .map(|current| current.level.version)
                .unwrap_or(0);
            let target = StockTarget {
                product_id: &product.id,
                branch_id: &new_sale.branch_id,
                product_name: &product.name,
            };
            let change = reserve_and_deduct(&mut tx, &target, line.quantity, expected_version, true).await?;

            let threshold = threshold_for(&change, product.low_stock_threshold);
            if low_stock_check(change.after.quantity, threshold) {
                low_stock.insert(
                    product.id.clone(),
                    LowStockItem {
                        product_id: product.id.clone(),
                        product_name: product.name.clone(),
                        branch_id: new_sale.branch_id.clone(),
                        quantity: change.after.quantity,
                        threshold,
                    },
                );
            } else {
                low_stock.remove(&product.id);
            }

            items.push(SaleItem {
                id: new_id(),
                sale_id: sale_id.clone(),
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                line_total_cents: line_total(line.unit_price, line.quantity)?.cents(),
                position: position as i64,
            });
            stock.push(change);
        }

        let lines: Vec<(Money, i64)> = new_sale
            .items
            .iter()
            .map(|l| (l.unit_price, l.quantity))
            .collect();
        let totals = compute_totals(&lines, new_sale.discount)?;
        reconcile_payments(totals.total, &new_sale.payments)?;
        let credit = classify_credit(
            totals.total,
            &new_sale.payments,
            new_sale.customer_name.as_deref(),
            new_sale.customer_phone.as_deref(),
        )?;

        let receipt_number = next_number(&mut tx, DocumentKind::Receipt, now).await?;

        let sale = Sale {
            id: sale_id.clone(),
            receipt_number,
            branch_id: new_sale.branch_id.clone(),
            user_id: actor.user_id.clone(),
            customer_name: new_sale.customer_name.clone(),
            customer_phone: new_sale.customer_phone.clone(),
            subtotal_cents: totals.subtotal.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            is_credit: credit.is_credit,
            credit_status: credit.credit_status,
            is_reversed: false,
            reversal_status: ReversalStatus::None,
            reversal_reason: None,
            reversal_requested_by: None,
            reversal_requested_at: None,
            admin_notes: None,
            reversed_by: None,
            reversed_at: None,
            created_at: now,
        };
        insert_sale(&mut tx, &sale).await?;

        for item in &items {
            insert_item(&mut tx, item).await?;
        }

        let mut payments = Vec::with_capacity(new_sale.payments.len());
        for input in &new_sale.payments {
            let payment = Payment {
                id: new_id(),
                sale_id: sale_id.clone(),
                method: input.method,
                amount_cents: input.amount.cents(),
                reference: input.reference.clone(),
                created_at: now,
            };
            insert_payment(&mut tx, &payment).await?;
            payments.push(payment);
        }

        audit::append(
            &mut tx,
            &NewAuditEntry::new(&actor.user_id, AuditAction::SaleCreated, EntityType::Sale, &sale.id)
                .with_new(json!({
                    "receipt_number": sale.receipt_number,
                    "branch_id": sale.branch_id,
                    "total_cents": sale.total_cents,
                    "discount_cents": sale.discount_cents,
                    "is_credit": sale.is_credit,
                    "credit_status": sale.credit_status,
                    "items": items.len(),
                })),
        )
        .await?;
        for change in &stock {
            change
                .audit(&mut tx, actor, StockMovementType::Sale, Some(&sale.id))
                .await?;
        }

        tx.commit().await?;

        let balance = if sale.is_credit {
            credit_balance(sale.total(), received_at_sale(&payments), Money::zero())
        } else {
            Money::zero()
        };

        info!(
            sale_id = %sale.id,
            receipt_number = %sale.receipt_number,
            branch_id = %sale.branch_id,
            total = %sale.total(),
            is_credit = sale.is_credit,
            "Sale committed"
        );

        Ok(SaleReceipt {
            detail: SaleDetail {
                sale,
                items,
                payments,
                credit_payments: Vec::new(),
                balance,
            },
            stock,
            low_stock: low_stock.into_values().collect(),
        })
    }

    /// Gets a sale row by ID.
    pub async fn get(&self, sale_id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        fetch_sale(&mut conn, sale_id).await
    }

    /// Gets a sale with its items, payments, settlements and balance.
    pub async fn get_detail(&self, sale_id: &str) -> DbResult<SaleDetail> {
        let mut conn = self.pool.acquire().await?;
        let sale = require_sale(&mut conn, sale_id).await?;
        load_detail(&mut conn, sale).await
    }

    /// Sales at a branch, newest first.
    pub async fn list_branch(&self, branch_id: &str, limit: i64) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            "SELECT * FROM sales WHERE branch_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )
        .bind(branch_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(sales)
    }
}

// =============================================================================
// Row Writes
// =============================================================================

async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(sale_id = %sale.id, receipt_number = %sale.receipt_number, "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, receipt_number, branch_id, user_id, customer_name, customer_phone,
            subtotal_cents, discount_cents, total_cents, is_credit, credit_status,
            is_reversed, reversal_status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.receipt_number)
    .bind(&sale.branch_id)
    .bind(&sale.user_id)
    .bind(&sale.customer_name)
    .bind(&sale.customer_phone)
    .bind(sale.subtotal_cents)
    .bind(sale.discount_cents)
    .bind(sale.total_cents)
    .bind(sale.is_credit)
    .bind(sale.credit_status)
    .bind(sale.is_reversed)
    .bind(sale.reversal_status)
    .bind(sale.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_item(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, product_id, product_name, quantity,
            unit_price_cents, line_total_cents, position
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(&item.product_id)
    .bind(&item.product_name)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.line_total_cents)
    .bind(item.position)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, sale_id, method, amount_cents, reference, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.sale_id)
    .bind(payment.method)
    .bind(payment.amount_cents)
    .bind(&payment.reference)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// In-Transaction Reads
// =============================================================================

pub(crate) async fn fetch_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Option<Sale>> {
    let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
        .bind(sale_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(sale)
}

/// Loads a sale or fails with `SaleNotFound`.
pub(crate) async fn require_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Sale> {
    Ok(fetch_sale(conn, sale_id)
        .await?
        .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?)
}

pub(crate) async fn fetch_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let items = sqlx::query_as::<_, SaleItem>(
        r#"
        SELECT id, sale_id, product_id, product_name, quantity,
               unit_price_cents, line_total_cents, position
        FROM sale_items
        WHERE sale_id = ?1
        ORDER BY position
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

pub(crate) async fn fetch_payments(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(
        r#"
        SELECT id, sale_id, method, amount_cents, reference, created_at
        FROM payments
        WHERE sale_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(payments)
}

pub(crate) async fn fetch_credit_payments(
    conn: &mut SqliteConnection,
    sale_id: &str,
) -> DbResult<Vec<CreditPayment>> {
    let payments = sqlx::query_as::<_, CreditPayment>(
        r#"
        SELECT id, sale_id, amount_cents, method, received_by, created_at
        FROM credit_payments
        WHERE sale_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(payments)
}

/// Outstanding balance recomputed from the stored rows.
pub(crate) fn balance_of(sale: &Sale, payments: &[Payment], credit_payments: &[CreditPayment]) -> Money {
    if !sale.is_credit {
        return Money::zero();
    }
    let settled: Money = credit_payments.iter().map(CreditPayment::amount).sum();
    credit_balance(sale.total(), received_at_sale(payments), settled)
}

/// Assembles a [`SaleDetail`] from fresh reads.
pub(crate) async fn load_detail(conn: &mut SqliteConnection, sale: Sale) -> DbResult<SaleDetail> {
    let items = fetch_items(conn, &sale.id).await?;
    let payments = fetch_payments(conn, &sale.id).await?;
    let credit_payments = fetch_credit_payments(conn, &sale.id).await?;
    let balance = balance_of(&sale, &payments, &credit_payments);

    Ok(SaleDetail {
        sale,
        items,
        payments,
        credit_payments,
        balance,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
