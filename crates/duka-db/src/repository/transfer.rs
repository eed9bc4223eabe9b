//! # Transfer Repository
//!
//! Inter-branch stock movement. Each workflow step is its own short
//! transaction; partial progress is always a valid, stored status.
//!
//! ## Stock Effects
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────────────────┐
//! │ Step         │ Inventory                                                │
//! ├──────────────┼──────────────────────────────────────────────────────────┤
//! │ request      │ none                                                     │
//! │ approve      │ none (sets quantity_approved, 0 when not listed)         │
//! │ pack         │ none                                                     │
//! │ dispatch     │ source −approved per item, all-or-nothing                │
//! │ receive      │ destination +received per item (row created if missing)  │
//! │ cancel       │ none, or source +dispatched when cancelled after dispatch│
//! │ auto-complete│ none (the restock that triggered it already added stock) │
//! └──────────────┴──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every status write carries `WHERE status = <status read>`, so two
//! concurrent steps on one transfer cannot both apply.

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use duka_core::transfer::{check_transition, plan_approval, plan_receipt};
use duka_core::validation::{
    validate_approved_items, validate_new_transfer, validate_optional_text, validate_received_items,
    validate_text,
};
use duka_core::{
    Actor, AuditAction, CoreError, EntityType, NewAuditEntry, NewTransfer, ReceivedItem,
    StockMovementType, Transfer, TransferDetail, TransferItem, TransferLineInput, TransferStatus,
    TransferTransition,
};

use super::audit;
use super::catalog::{require_active_branch, require_active_product};
use super::inventory::{read_level, reserve_and_deduct, restore, StockChange, StockTarget};
use super::new_id;
use super::sequence::{next_number, DocumentKind};
use crate::error::{DbError, DbResult};

// =============================================================================
// Outcomes
// =============================================================================

/// A transfer after one workflow step.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub detail: TransferDetail,
    /// Status before the step; `None` for a new request.
    pub previous: Option<TransferStatus>,
    /// Inventory rows the step changed.
    pub stock: Vec<StockChange>,
}

/// A transfer completed by the closed-loop rule.
#[derive(Debug, Clone)]
pub struct AutoCompletion {
    pub previous: TransferStatus,
    pub transfer: Transfer,
}

// =============================================================================
// Status Writes
// =============================================================================

/// Optional columns a step sets alongside its status.
#[derive(Debug, Default)]
struct StepFields<'a> {
    parcel_tracking: Option<&'a str>,
    discrepancy_notes: Option<&'a str>,
    cancel_reason: Option<&'a str>,
    auto_completed: bool,
}

/// Actor/timestamp columns stamped when entering `status`.
const fn stamp_columns(status: TransferStatus) -> (&'static str, &'static str) {
    match status {
        TransferStatus::Requested => ("requested_by", "requested_at"),
        TransferStatus::Approved => ("approved_by", "approved_at"),
        TransferStatus::Packed => ("packed_by", "packed_at"),
        TransferStatus::Dispatched => ("dispatched_by", "dispatched_at"),
        TransferStatus::Received | TransferStatus::ReceivedWithDiscrepancy => {
            ("received_by", "received_at")
        }
        TransferStatus::Cancelled => ("cancelled_by", "cancelled_at"),
    }
}

/// Moves a transfer from `from` to `to`. Fails stale if the status moved.
async fn advance(
    conn: &mut SqliteConnection,
    transfer_id: &str,
    from: TransferStatus,
    to: TransferStatus,
    actor: &Actor,
    now: DateTime<Utc>,
    fields: StepFields<'_>,
) -> DbResult<()> {
    let (by_column, at_column) = stamp_columns(to);
    let sql = format!(
        r#"
        UPDATE transfers SET
            status = ?3,
            {by_column} = ?4,
            {at_column} = ?5,
            updated_at = ?5,
            parcel_tracking = COALESCE(?6, parcel_tracking),
            discrepancy_notes = COALESCE(?7, discrepancy_notes),
            cancel_reason = COALESCE(?8, cancel_reason),
            auto_completed = auto_completed OR ?9
        WHERE id = ?1 AND status = ?2
        "#
    );

    let result = sqlx::query(&sql)
        .bind(transfer_id)
        .bind(from)
        .bind(to)
        .bind(&actor.user_id)
        .bind(now)
        .bind(fields.parcel_tracking)
        .bind(fields.discrepancy_notes)
        .bind(fields.cancel_reason)
        .bind(fields.auto_completed)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::stale("Transfer", transfer_id, 0));
    }

    debug!(transfer_id, from = from.as_str(), to = to.as_str(), "Transfer advanced");
    Ok(())
}

/// Audit row for a status change.
fn status_entry(
    actor: &Actor,
    action: AuditAction,
    transfer_id: &str,
    from: TransferStatus,
    to: TransferStatus,
    detail: serde_json::Value,
) -> NewAuditEntry {
    let mut new_value = json!({ "status": to });
    if let (Some(target), serde_json::Value::Object(extra)) = (new_value.as_object_mut(), detail) {
        target.extend(extra);
    }
    NewAuditEntry::new(&actor.user_id, action, EntityType::Transfer, transfer_id)
        .with_old(json!({ "status": from }))
        .with_new(new_value)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for inter-branch transfers.
#[derive(Debug, Clone)]
pub struct TransferRepository {
    pool: SqlitePool,
}

impl TransferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransferRepository { pool }
    }

    /// Creates a transfer at REQUESTED. No stock moves.
    pub async fn request(&self, new_transfer: &NewTransfer, actor: &Actor) -> DbResult<TransferOutcome> {
        validate_new_transfer(new_transfer)?;

        let mut tx = self.pool.begin().await?;
        require_active_branch(&mut tx, &new_transfer.from_branch_id).await?;
        require_active_branch(&mut tx, &new_transfer.to_branch_id).await?;

        let now = Utc::now();
        let transfer_id = new_id();
        let transfer_number = next_number(&mut tx, DocumentKind::Transfer, now).await?;

        sqlx::query(
            r#"
            INSERT INTO transfers (
                id, transfer_number, from_branch_id, to_branch_id, status, notes,
                requested_by, requested_at, auto_completed, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?8)
            "#,
        )
        .bind(&transfer_id)
        .bind(&transfer_number)
        .bind(&new_transfer.from_branch_id)
        .bind(&new_transfer.to_branch_id)
        .bind(TransferStatus::Requested)
        .bind(&new_transfer.notes)
        .bind(&actor.user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (position, line) in new_transfer.items.iter().enumerate() {
            let product = require_active_product(&mut tx, &line.product_id).await?;
            sqlx::query(
                r#"
                INSERT INTO transfer_items (
                    id, transfer_id, product_id, product_name, quantity_requested, position
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(new_id())
            .bind(&transfer_id)
            .bind(&product.id)
            .bind(&product.name)
            .bind(line.quantity)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        audit::append(
            &mut tx,
            &NewAuditEntry::new(&actor.user_id, AuditAction::TransferRequested, EntityType::Transfer, &transfer_id)
                .with_new(json!({
                    "status": TransferStatus::Requested,
                    "transfer_number": transfer_number,
                    "from_branch_id": new_transfer.from_branch_id,
                    "to_branch_id": new_transfer.to_branch_id,
                    "items": new_transfer.items,
                })),
        )
        .await?;

        let detail = load_detail(&mut tx, &transfer_id).await?;
        tx.commit().await?;

        info!(
            transfer_id = %transfer_id,
            transfer_number = %detail.transfer.transfer_number,
            from_branch_id = %new_transfer.from_branch_id,
            to_branch_id = %new_transfer.to_branch_id,
            "Transfer requested"
        );

        Ok(TransferOutcome {
            detail,
            previous: None,
            stock: Vec::new(),
        })
    }

    /// Approves from REQUESTED, possibly for less than requested.
    pub async fn approve(
        &self,
        transfer_id: &str,
        approved: &[TransferLineInput],
        actor: &Actor,
    ) -> DbResult<TransferOutcome> {
        validate_approved_items(approved)?;

        let mut tx = self.pool.begin().await?;
        let current = require_transfer(&mut tx, transfer_id).await?;
        let next = check_transition(transfer_id, current.status, TransferTransition::Approve)?;

        let items = fetch_items(&mut tx, transfer_id).await?;
        let plan = plan_approval(transfer_id, &items, approved)?;
        for (item_id, quantity) in &plan {
            sqlx::query("UPDATE transfer_items SET quantity_approved = ?2 WHERE id = ?1")
                .bind(item_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
        }

        let now = Utc::now();
        advance(&mut tx, transfer_id, current.status, next, actor, now, StepFields::default()).await?;
        audit::append(
            &mut tx,
            &status_entry(
                actor,
                AuditAction::TransferApproved,
                transfer_id,
                current.status,
                next,
                json!({ "approved": approved }),
            ),
        )
        .await?;

        self.finish(tx, transfer_id, current.status, Vec::new()).await
    }

    /// APPROVED → PACKED. Status only.
    pub async fn pack(&self, transfer_id: &str, actor: &Actor) -> DbResult<TransferOutcome> {
        let mut tx = self.pool.begin().await?;
        let current = require_transfer(&mut tx, transfer_id).await?;
        let next = check_transition(transfer_id, current.status, TransferTransition::Pack)?;

        advance(&mut tx, transfer_id, current.status, next, actor, Utc::now(), StepFields::default()).await?;
        audit::append(
            &mut tx,
            &status_entry(actor, AuditAction::TransferPacked, transfer_id, current.status, next, json!({})),
        )
        .await?;

        self.finish(tx, transfer_id, current.status, Vec::new()).await
    }

    /// Deducts approved quantities at the source and moves to DISPATCHED.
    ///
    /// All items or none: one short item aborts the whole dispatch.
    pub async fn dispatch(
        &self,
        transfer_id: &str,
        parcel_tracking: Option<&str>,
        actor: &Actor,
    ) -> DbResult<TransferOutcome> {
        validate_optional_text("parcel_tracking", parcel_tracking)?;

        let mut tx = self.pool.begin().await?;
        let current = require_transfer(&mut tx, transfer_id).await?;
        let next = check_transition(transfer_id, current.status, TransferTransition::Dispatch)?;

        let mut stock = Vec::new();
        for item in fetch_items(&mut tx, transfer_id).await? {
            let quantity = item.quantity_approved.unwrap_or(0);
            if quantity > 0 {
                let expected_version = read_level(&mut tx, &item.product_id, &current.from_branch_id)
                    .await?
                    .map(|level| level.level.version)
                    .unwrap_or(0);
                let target = StockTarget {
                    product_id: &item.product_id,
                    branch_id: &current.from_branch_id,
                    product_name: &item.product_name,
                };
                let change = reserve_and_deduct(&mut tx, &target, quantity, expected_version, false).await?;
                change
                    .audit(&mut tx, actor, StockMovementType::TransferOut, Some(transfer_id))
                    .await?;
                stock.push(change);
            }

            sqlx::query("UPDATE transfer_items SET quantity_dispatched = ?2 WHERE id = ?1")
                .bind(&item.id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
        }

        let fields = StepFields {
            parcel_tracking,
            ..StepFields::default()
        };
        advance(&mut tx, transfer_id, current.status, next, actor, Utc::now(), fields).await?;
        audit::append(
            &mut tx,
            &status_entry(
                actor,
                AuditAction::TransferDispatched,
                transfer_id,
                current.status,
                next,
                json!({ "parcel_tracking": parcel_tracking }),
            ),
        )
        .await?;

        self.finish(tx, transfer_id, current.status, stock).await
    }

    /// Credits received quantities at the destination.
    ///
    /// Any mismatch with the dispatched quantities ends in
    /// RECEIVED_WITH_DISCREPANCY and requires notes. The stock credited is
    /// what physically arrived either way.
    pub async fn receive(
        &self,
        transfer_id: &str,
        received: &[ReceivedItem],
        discrepancy_notes: Option<&str>,
        actor: &Actor,
    ) -> DbResult<TransferOutcome> {
        validate_received_items(received)?;
        validate_optional_text("discrepancy_notes", discrepancy_notes)?;

        let mut tx = self.pool.begin().await?;
        let current = require_transfer(&mut tx, transfer_id).await?;
        // status check before planning so a wrong-state receipt reports the state
        check_transition(transfer_id, current.status, TransferTransition::Receive { discrepancy: false })?;

        let items = fetch_items(&mut tx, transfer_id).await?;
        let plan = plan_receipt(transfer_id, &items, received, discrepancy_notes)?;
        let next = check_transition(
            transfer_id,
            current.status,
            TransferTransition::Receive {
                discrepancy: plan.has_discrepancy,
            },
        )?;

        let mut stock = Vec::new();
        for line in &plan.lines {
            if line.quantity_received > 0 {
                let change = restore(
                    &mut tx,
                    &line.product_id,
                    &current.to_branch_id,
                    line.quantity_received,
                    None,
                )
                .await?;
                change
                    .audit(&mut tx, actor, StockMovementType::TransferIn, Some(transfer_id))
                    .await?;
                stock.push(change);
            }

            sqlx::query(
                "UPDATE transfer_items SET quantity_received = ?2, discrepancy_reason = ?3 WHERE id = ?1",
            )
            .bind(&line.item_id)
            .bind(line.quantity_received)
            .bind(&line.discrepancy_reason)
            .execute(&mut *tx)
            .await?;
        }

        let notes = discrepancy_notes.map(str::trim).filter(|n| !n.is_empty());
        let fields = StepFields {
            discrepancy_notes: notes,
            ..StepFields::default()
        };
        advance(&mut tx, transfer_id, current.status, next, actor, Utc::now(), fields).await?;
        audit::append(
            &mut tx,
            &status_entry(
                actor,
                AuditAction::TransferReceived,
                transfer_id,
                current.status,
                next,
                json!({
                    "has_discrepancy": plan.has_discrepancy,
                    "discrepancy_notes": notes,
                }),
            ),
        )
        .await?;

        self.finish(tx, transfer_id, current.status, stock).await
    }

    /// Cancels from any non-terminal status.
    ///
    /// After dispatch the deducted stock goes back to the source branch, one
    /// `STOCK_TRANSFER_RETURNED` audit row per item.
    pub async fn cancel(&self, transfer_id: &str, reason: &str, actor: &Actor) -> DbResult<TransferOutcome> {
        validate_text("reason", reason)?;

        let mut tx = self.pool.begin().await?;
        let current = require_transfer(&mut tx, transfer_id).await?;
        let next = check_transition(transfer_id, current.status, TransferTransition::Cancel)?;

        let mut stock = Vec::new();
        if current.status == TransferStatus::Dispatched {
            for item in fetch_items(&mut tx, transfer_id).await? {
                let quantity = item.quantity_dispatched.unwrap_or(0);
                if quantity == 0 {
                    continue;
                }
                let change = restore(&mut tx, &item.product_id, &current.from_branch_id, quantity, None).await?;
                change
                    .audit(&mut tx, actor, StockMovementType::TransferReturn, Some(transfer_id))
                    .await?;
                stock.push(change);
            }
        }

        let fields = StepFields {
            cancel_reason: Some(reason.trim()),
            ..StepFields::default()
        };
        advance(&mut tx, transfer_id, current.status, next, actor, Utc::now(), fields).await?;
        audit::append(
            &mut tx,
            &status_entry(
                actor,
                AuditAction::TransferCancelled,
                transfer_id,
                current.status,
                next,
                json!({ "reason": reason.trim(), "items_returned": stock.len() }),
            ),
        )
        .await?;

        self.finish(tx, transfer_id, current.status, stock).await
    }

    /// Gets a transfer with its items.
    pub async fn get(&self, transfer_id: &str) -> DbResult<TransferDetail> {
        let mut conn = self.pool.acquire().await?;
        load_detail(&mut conn, transfer_id).await
    }

    /// Transfers into or out of a branch, newest first.
    pub async fn list(&self, branch_id: &str, status: Option<TransferStatus>) -> DbResult<Vec<Transfer>> {
        let transfers = sqlx::query_as::<_, Transfer>(
            r#"
            SELECT * FROM transfers
            WHERE (from_branch_id = ?1 OR to_branch_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY requested_at DESC, rowid DESC
            "#,
        )
        .bind(branch_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(transfers)
    }

    async fn finish(
        &self,
        mut tx: sqlx::Transaction<'_, sqlx::Sqlite>,
        transfer_id: &str,
        previous: TransferStatus,
        stock: Vec<StockChange>,
    ) -> DbResult<TransferOutcome> {
        let detail = load_detail(&mut tx, transfer_id).await?;
        tx.commit().await?;

        info!(
            transfer_id,
            transfer_number = %detail.transfer.transfer_number,
            from = previous.as_str(),
            to = detail.transfer.status.as_str(),
            stock_rows = stock.len(),
            "Transfer step committed"
        );

        Ok(TransferOutcome {
            detail,
            previous: Some(previous),
            stock,
        })
    }
}

// =============================================================================
// Closed-Loop Fulfilment
// =============================================================================

/// Completes pending transfers satisfied by a restock.
///
/// Runs inside the restock transaction. Transfers whose source is the
/// restocked branch, still REQUESTED or APPROVED, and carrying the product
/// go straight to RECEIVED. Stock is not touched here.
pub(crate) async fn auto_complete_for_restock(
    conn: &mut SqliteConnection,
    branch_id: &str,
    product_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> DbResult<Vec<AutoCompletion>> {
    let pending = sqlx::query_as::<_, Transfer>(
        r#"
        SELECT t.* FROM transfers t
        JOIN transfer_items i ON i.transfer_id = t.id
        WHERE t.from_branch_id = ?1
          AND i.product_id = ?2
          AND t.status IN (?3, ?4)
        ORDER BY t.requested_at, t.rowid
        "#,
    )
    .bind(branch_id)
    .bind(product_id)
    .bind(TransferStatus::AUTO_COMPLETABLE[0])
    .bind(TransferStatus::AUTO_COMPLETABLE[1])
    .fetch_all(&mut *conn)
    .await?;

    let mut completed = Vec::with_capacity(pending.len());
    for transfer in pending {
        let next = check_transition(&transfer.id, transfer.status, TransferTransition::AutoComplete)?;
        let fields = StepFields {
            auto_completed: true,
            ..StepFields::default()
        };
        advance(conn, &transfer.id, transfer.status, next, actor, now, fields).await?;
        audit::append(
            conn,
            &status_entry(
                actor,
                AuditAction::TransferAutoCompleted,
                &transfer.id,
                transfer.status,
                next,
                json!({ "restocked_product_id": product_id, "branch_id": branch_id }),
            ),
        )
        .await?;

        info!(
            transfer_id = %transfer.id,
            transfer_number = %transfer.transfer_number,
            product_id,
            "Transfer auto-completed by restock"
        );

        completed.push(AutoCompletion {
            previous: transfer.status,
            transfer: require_transfer(conn, &transfer.id).await?,
        });
    }

    Ok(completed)
}

// =============================================================================
// In-Transaction Reads
// =============================================================================

async fn require_transfer(conn: &mut SqliteConnection, transfer_id: &str) -> DbResult<Transfer> {
    let transfer = sqlx::query_as::<_, Transfer>("SELECT * FROM transfers WHERE id = ?1")
        .bind(transfer_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::TransferNotFound(transfer_id.to_string()))?;
    Ok(transfer)
}

async fn fetch_items(conn: &mut SqliteConnection, transfer_id: &str) -> DbResult<Vec<TransferItem>> {
    let items = sqlx::query_as::<_, TransferItem>(
        r#"
        SELECT id, transfer_id, product_id, product_name, quantity_requested, quantity_approved,
               quantity_dispatched, quantity_received, discrepancy_reason, position
        FROM transfer_items
        WHERE transfer_id = ?1
        ORDER BY position
        "#,
    )
    .bind(transfer_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

async fn load_detail(conn: &mut SqliteConnection, transfer_id: &str) -> DbResult<TransferDetail> {
    let transfer = require_transfer(conn, transfer_id).await?;
    let items = fetch_items(conn, transfer_id).await?;
    Ok(TransferDetail { transfer, items })
}

// =============================================================================
// Unit Tests
// =============================================================================
