//! # Engine Events
//!
//! Notifications emitted after a transaction commits.
//!
//! ## Topics and Audiences
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Post-Commit Events                                 │
//! │                                                                         │
//! │  TOPIC                     CHANNELS                                     │
//! │  ─────                     ────────                                     │
//! │  sale.created              branch:<sale branch>, global                 │
//! │  inventory.updated         branch:<row branch>, global                  │
//! │  lowStock.alert            branch:<row branch>, global                  │
//! │  reversal.requested        branch:<sale branch>, global                 │
//! │  reversal.decision         branch:<sale branch>, global                 │
//! │  transfer.statusChanged    branch:<from>, branch:<to>, global           │
//! │  credit.paymentRecorded    branch:<sale branch>, global                 │
//! │                                                                         │
//! │  "global" is the overseer group that watches every branch.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Adjacently tagged JSON; the tag is the topic:
//! ```json
//! { "type": "sale.created", "payload": { "saleId": "...", "branchId": "..." } }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use duka_core::{
    CreditStatus, LowStockItem, Money, ReversalDecision, Sale, StockMovementType, Transfer,
    TransferStatus,
};
use duka_db::StockChange;

/// Subscriber group an event is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
#[ts(export)]
pub enum Channel {
    /// Staff of one branch.
    Branch(String),
    /// Overseers watching every branch.
    Global,
}

// =============================================================================
// Main Event Enum (Tagged Union)
// =============================================================================

/// Everything the engine announces after commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload")]
#[ts(export)]
pub enum EngineEvent {
    #[serde(rename = "sale.created")]
    SaleCreated(SaleCreated),

    #[serde(rename = "inventory.updated")]
    InventoryUpdated(InventoryUpdated),

    #[serde(rename = "lowStock.alert")]
    LowStockAlert(LowStockItem),

    #[serde(rename = "reversal.requested")]
    ReversalRequested(ReversalRequested),

    #[serde(rename = "reversal.decision")]
    ReversalDecision(ReversalDecided),

    #[serde(rename = "transfer.statusChanged")]
    TransferStatusChanged(TransferStatusChanged),

    #[serde(rename = "credit.paymentRecorded")]
    CreditPaymentRecorded(CreditPaymentRecorded),
}

impl EngineEvent {
    /// Topic name, as seen by subscribers.
    pub fn topic(&self) -> &'static str {
        match self {
            EngineEvent::SaleCreated(_) => "sale.created",
            EngineEvent::InventoryUpdated(_) => "inventory.updated",
            EngineEvent::LowStockAlert(_) => "lowStock.alert",
            EngineEvent::ReversalRequested(_) => "reversal.requested",
            EngineEvent::ReversalDecision(_) => "reversal.decision",
            EngineEvent::TransferStatusChanged(_) => "transfer.statusChanged",
            EngineEvent::CreditPaymentRecorded(_) => "credit.paymentRecorded",
        }
    }

    /// Groups that should receive this event.
    pub fn channels(&self) -> Vec<Channel> {
        let branch = |id: &str| Channel::Branch(id.to_string());
        match self {
            EngineEvent::SaleCreated(e) => vec![branch(&e.branch_id), Channel::Global],
            EngineEvent::InventoryUpdated(e) => vec![branch(&e.branch_id), Channel::Global],
            EngineEvent::LowStockAlert(e) => vec![branch(&e.branch_id), Channel::Global],
            EngineEvent::ReversalRequested(e) => vec![branch(&e.branch_id), Channel::Global],
            EngineEvent::ReversalDecision(e) => vec![branch(&e.branch_id), Channel::Global],
            EngineEvent::TransferStatusChanged(e) => vec![
                branch(&e.from_branch_id),
                branch(&e.to_branch_id),
                Channel::Global,
            ],
            EngineEvent::CreditPaymentRecorded(e) => vec![branch(&e.branch_id), Channel::Global],
        }
    }

    /// True when a subscriber on `channel` should see this event.
    pub fn is_for(&self, channel: &Channel) -> bool {
        self.channels().contains(channel)
    }
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SaleCreated {
    pub sale_id: String,
    pub receipt_number: String,
    pub branch_id: String,
    pub cashier_id: String,
    pub total: Money,
    pub is_credit: bool,
    pub credit_status: Option<CreditStatus>,
}

impl From<&Sale> for SaleCreated {
    fn from(sale: &Sale) -> Self {
        SaleCreated {
            sale_id: sale.id.clone(),
            receipt_number: sale.receipt_number.clone(),
            branch_id: sale.branch_id.clone(),
            cashier_id: sale.user_id.clone(),
            total: sale.total(),
            is_credit: sale.is_credit,
            credit_status: sale.credit_status,
        }
    }
}

/// New on-hand quantity of one inventory row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InventoryUpdated {
    pub product_id: String,
    pub branch_id: String,
    pub quantity: i64,
    pub delta: i64,
    pub version: i64,
    pub reason: StockMovementType,
    /// Sale or transfer that moved the stock.
    pub reference_id: Option<String>,
}

impl InventoryUpdated {
    pub fn from_change(change: &StockChange, reason: StockMovementType, reference_id: Option<&str>) -> Self {
        InventoryUpdated {
            product_id: change.product_id.clone(),
            branch_id: change.branch_id.clone(),
            quantity: change.after.quantity,
            delta: change.after.quantity - change.before.quantity,
            version: change.after.version,
            reason,
            reference_id: reference_id.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReversalRequested {
    pub sale_id: String,
    pub receipt_number: String,
    pub branch_id: String,
    pub reason: String,
    pub requested_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReversalDecided {
    pub sale_id: String,
    pub receipt_number: String,
    pub branch_id: String,
    pub decision: ReversalDecision,
    pub decided_by: String,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TransferStatusChanged {
    pub transfer_id: String,
    pub transfer_number: String,
    pub from_branch_id: String,
    pub to_branch_id: String,
    /// None for a new request.
    pub previous: Option<TransferStatus>,
    pub status: TransferStatus,
    pub auto_completed: bool,
}

impl TransferStatusChanged {
    pub fn new(transfer: &Transfer, previous: Option<TransferStatus>) -> Self {
        TransferStatusChanged {
            transfer_id: transfer.id.clone(),
            transfer_number: transfer.transfer_number.clone(),
            from_branch_id: transfer.from_branch_id.clone(),
            to_branch_id: transfer.to_branch_id.clone(),
            previous,
            status: transfer.status,
            auto_completed: transfer.auto_completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreditPaymentRecorded {
    pub sale_id: String,
    pub receipt_number: String,
    pub branch_id: String,
    pub amount: Money,
    pub balance: Money,
    pub credit_status: Option<CreditStatus>,
}

// =============================================================================
// Unit Tests
// =============================================================================
