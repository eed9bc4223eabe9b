//! # Audit Trail Vocabulary
//!
//! Every mutation writes audit rows in the same transaction as the change it
//! documents. This module defines what those rows say; `duka-db` writes them.
//!
//! ## Rows per Operation
//! ```text
//! ┌──────────────────────────┬──────────────────────────────────────────────┐
//! │ create sale              │ SALE_CREATED + STOCK_DEDUCTED per item       │
//! │ record credit payment    │ CREDIT_PAYMENT_RECORDED                      │
//! │ request reversal         │ REVERSAL_REQUESTED                           │
//! │ approve reversal         │ STOCK_RETURNED per item + REVERSAL_APPROVED  │
//! │ reject reversal          │ REVERSAL_REJECTED                            │
//! │ transfer step            │ TRANSFER_<STEP> (+ stock row per item moved) │
//! │ restock                  │ STOCK_RESTOCKED + TRANSFER_AUTO_COMPLETED*   │
//! └──────────────────────────┴──────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

// =============================================================================
// Vocabulary
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    SaleCreated,
    StockDeducted,
    StockReturned,
    CreditPaymentRecorded,
    ReversalRequested,
    ReversalApproved,
    ReversalRejected,
    TransferRequested,
    TransferApproved,
    TransferPacked,
    TransferDispatched,
    TransferReceived,
    TransferCancelled,
    TransferAutoCompleted,
    StockRestocked,
    StockTransferredOut,
    StockTransferredIn,
    StockTransferReturned,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Sale,
    Inventory,
    Transfer,
}

/// Kind of stock movement recorded against an inventory row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockMovementType {
    Sale,
    Return,
    TransferOut,
    TransferIn,
    /// Dispatched stock returned to the source by a cancellation.
    TransferReturn,
    Restock,
}

impl StockMovementType {
    /// Audit action a movement of this kind is logged under.
    pub const fn action(&self) -> AuditAction {
        match self {
            StockMovementType::Sale => AuditAction::StockDeducted,
            StockMovementType::Return => AuditAction::StockReturned,
            StockMovementType::TransferOut => AuditAction::StockTransferredOut,
            StockMovementType::TransferIn => AuditAction::StockTransferredIn,
            StockMovementType::TransferReturn => AuditAction::StockTransferReturned,
            StockMovementType::Restock => AuditAction::StockRestocked,
        }
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// A change to one inventory row, serialized into the audit `new_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockMovement {
    pub movement_type: StockMovementType,
    pub product_id: String,
    pub branch_id: String,
    /// Signed change: negative for deductions.
    pub delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub version_after: i64,
    /// Sale or transfer that caused the movement.
    pub reference_id: Option<String>,
}

// =============================================================================
// Entries
// =============================================================================

/// An audit row to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub user_id: String,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl NewAuditEntry {
    pub fn new(
        user_id: impl Into<String>,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: impl Into<String>,
    ) -> Self {
        NewAuditEntry {
            user_id: user_id.into(),
            action,
            entity_type,
            entity_id: entity_id.into(),
            old_value: None,
            new_value: None,
        }
    }

    pub fn with_old(mut self, value: Value) -> Self {
        self.old_value = Some(value);
        self
    }

    pub fn with_new(mut self, value: Value) -> Self {
        self.new_value = Some(value);
        self
    }

    /// Entry for a stock movement against `inventory_id`.
    pub fn stock(user_id: impl Into<String>, inventory_id: impl Into<String>, movement: &StockMovement) -> Self {
        let entry = NewAuditEntry::new(
            user_id,
            movement.movement_type.action(),
            EntityType::Inventory,
            inventory_id,
        )
        .with_old(serde_json::json!({ "quantity": movement.quantity_before }));

        match serde_json::to_value(movement) {
            Ok(value) => entry.with_new(value),
            Err(_) => entry,
        }
    }
}

/// A stored audit row. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AuditEntry {
    pub id: String,
    pub user_id: String,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: String,
    /// JSON document.
    pub old_value: Option<String>,
    /// JSON document.
    pub new_value: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Parsed `new_value`, if present and valid JSON.
    pub fn new_json(&self) -> Option<Value> {
        self.new_value
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
    }

    /// Parsed `old_value`, if present and valid JSON.
    pub fn old_json(&self) -> Option<Value> {
        self.old_value
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
    }

    /// The stock movement this entry records, if it is a stock entry.
    pub fn stock_movement(&self) -> Option<StockMovement> {
        self.new_json().and_then(|v| serde_json::from_value(v).ok())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_maps_to_action() {
        assert_eq!(StockMovementType::Return.action(), AuditAction::StockReturned);
        assert_eq!(StockMovementType::Sale.action(), AuditAction::StockDeducted);
    }

    #[test]
    fn test_stock_entry_round_trips_movement() {
        let movement = StockMovement {
            movement_type: StockMovementType::Return,
            product_id: "p-1".into(),
            branch_id: "b-1".into(),
            delta: 2,
            quantity_before: 3,
            quantity_after: 5,
            version_after: 4,
            reference_id: Some("s-1".into()),
        };
        let entry = NewAuditEntry::stock("u-1", "inv-1", &movement);
        assert_eq!(entry.action, AuditAction::StockReturned);
        assert_eq!(entry.entity_type, EntityType::Inventory);

        let stored = AuditEntry {
            id: "a-1".into(),
            user_id: entry.user_id.clone(),
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id.clone(),
            old_value: entry.old_value.as_ref().map(|v| v.to_string()),
            new_value: entry.new_value.as_ref().map(|v| v.to_string()),
            created_at: Utc::now(),
        };
        assert_eq!(stored.stock_movement(), Some(movement));
        assert_eq!(stored.old_json().unwrap()["quantity"], 3);
    }

    #[test]
    fn test_action_serializes_screaming_snake() {
        let json = serde_json::to_string(&AuditAction::TransferAutoCompleted).unwrap();
        assert_eq!(json, "\"TRANSFER_AUTO_COMPLETED\"");
    }
}
