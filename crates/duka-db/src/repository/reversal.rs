//! # Reversal Repository
//!
//! Two-step undo of a committed sale.
//!
//! ```text
//!   NONE ──request──▶ PENDING ──decide(APPROVED)──▶ APPROVED  (stock restored, is_reversed)
//!                        │
//!                        └─────decide(REJECTED)──▶ REJECTED  (nothing else changes)
//! ```
//!
//! Both steps update the sale with the status they read in the `WHERE`
//! clause, so two approvers racing on the same sale cannot both win.

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;

use duka_core::validation::{validate_optional_text, validate_text};
use duka_core::{
    Actor, AuditAction, CoreError, EntityType, NewAuditEntry, ReversalDecision, ReversalStatus,
    Sale, StockMovementType,
};

use super::audit;
use super::inventory::{restore, StockChange};
use super::sale::{fetch_items, require_sale};
use crate::error::{DbError, DbResult};

/// Result of a reversal decision.
#[derive(Debug, Clone)]
pub struct ReversalOutcome {
    pub sale: Sale,
    pub decision: ReversalDecision,
    /// One entry per sale line; empty when rejected.
    pub restored: Vec<StockChange>,
}

/// Repository for sale reversals.
#[derive(Debug, Clone)]
pub struct ReversalRepository {
    pool: SqlitePool,
}

impl ReversalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReversalRepository { pool }
    }

    /// Opens a reversal request. Inventory is untouched until approval.
    pub async fn request(&self, sale_id: &str, reason: &str, actor: &Actor) -> DbResult<Sale> {
        validate_text("reason", reason)?;

        let mut tx = self.pool.begin().await?;
        let sale = require_sale(&mut tx, sale_id).await?;
        ensure_status(&sale, ReversalStatus::None, "request reversal")?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                reversal_status = 'PENDING',
                reversal_reason = ?2,
                reversal_requested_by = ?3,
                reversal_requested_at = ?4
            WHERE id = ?1 AND reversal_status = 'NONE' AND is_reversed = 0
            "#,
        )
        .bind(sale_id)
        .bind(reason.trim())
        .bind(&actor.user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::stale("Sale", sale_id, 0));
        }

        audit::append(
            &mut tx,
            &NewAuditEntry::new(&actor.user_id, AuditAction::ReversalRequested, EntityType::Sale, sale_id)
                .with_old(json!({ "reversal_status": ReversalStatus::None }))
                .with_new(json!({
                    "reversal_status": ReversalStatus::Pending,
                    "reason": reason.trim(),
                })),
        )
        .await?;

        let sale = require_sale(&mut tx, sale_id).await?;
        tx.commit().await?;

        info!(sale_id, receipt_number = %sale.receipt_number, "Reversal requested");
        Ok(sale)
    }

    /// Approves or rejects a pending reversal.
    ///
    /// Approval restores every sale line at the sale's branch, one
    /// `STOCK_RETURNED` audit row per line, then marks the sale reversed.
    pub async fn decide(
        &self,
        sale_id: &str,
        decision: ReversalDecision,
        admin_notes: Option<&str>,
        actor: &Actor,
    ) -> DbResult<ReversalOutcome> {
        validate_optional_text("admin_notes", admin_notes)?;

        let mut tx = self.pool.begin().await?;
        let sale = require_sale(&mut tx, sale_id).await?;
        ensure_status(&sale, ReversalStatus::Pending, "decide reversal")?;

        let mut restored = Vec::new();
        if decision == ReversalDecision::Approved {
            for item in fetch_items(&mut tx, sale_id).await? {
                let change = restore(&mut tx, &item.product_id, &sale.branch_id, item.quantity, None).await?;
                change
                    .audit(&mut tx, actor, StockMovementType::Return, Some(sale_id))
                    .await?;
                restored.push(change);
            }
        }

        let status = decision.status();
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                reversal_status = ?2,
                admin_notes = ?3,
                is_reversed = ?4,
                reversed_by = CASE WHEN ?4 THEN ?5 ELSE reversed_by END,
                reversed_at = CASE WHEN ?4 THEN ?6 ELSE reversed_at END
            WHERE id = ?1 AND reversal_status = 'PENDING' AND is_reversed = 0
            "#,
        )
        .bind(sale_id)
        .bind(status)
        .bind(admin_notes)
        .bind(decision == ReversalDecision::Approved)
        .bind(&actor.user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::stale("Sale", sale_id, 0));
        }

        let action = match decision {
            ReversalDecision::Approved => AuditAction::ReversalApproved,
            ReversalDecision::Rejected => AuditAction::ReversalRejected,
        };
        audit::append(
            &mut tx,
            &NewAuditEntry::new(&actor.user_id, action, EntityType::Sale, sale_id)
                .with_old(json!({ "reversal_status": ReversalStatus::Pending, "is_reversed": false }))
                .with_new(json!({
                    "reversal_status": status,
                    "is_reversed": decision == ReversalDecision::Approved,
                    "admin_notes": admin_notes,
                    "items_restored": restored.len(),
                })),
        )
        .await?;

        let sale = require_sale(&mut tx, sale_id).await?;
        tx.commit().await?;

        info!(
            sale_id,
            receipt_number = %sale.receipt_number,
            decision = status.as_str(),
            items_restored = restored.len(),
            "Reversal decided"
        );

        Ok(ReversalOutcome {
            sale,
            decision,
            restored,
        })
    }
}

/// Rejects the step unless the sale is unreversed and in `expected`.
fn ensure_status(sale: &Sale, expected: ReversalStatus, action: &str) -> Result<(), CoreError> {
    if sale.is_reversed {
        return Err(CoreError::invalid_transition("Sale", &sale.id, "REVERSED", action));
    }
    if sale.reversal_status != expected {
        return Err(CoreError::invalid_transition(
            "Sale",
            &sale.id,
            sale.reversal_status.as_str(),
            action,
        ));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
