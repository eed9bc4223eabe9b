//! # Transfer Workflow Rules
//!
//! Inter-branch stock movement as an explicit state machine.
//!
//! ## Transition Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  REQUESTED ──approve──► APPROVED ──pack──► PACKED                       │
//! │      │                    │   │               │                         │
//! │      │                    │   └──dispatch──┐  │dispatch                 │
//! │      │                    │                ▼  ▼                         │
//! │      │                    │             DISPATCHED ──receive──► RECEIVED│
//! │      │                    │                │         └──────► RECEIVED_ │
//! │      │                    │                │             WITH_DISCREPANCY│
//! │      └──auto_complete─────┴──► RECEIVED    │                            │
//! │                                            │                            │
//! │  any non-terminal ──cancel──► CANCELLED ◄──┘                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every transition function in `duka-db` calls [`check_transition`] against
//! the status it read inside its transaction before touching anything.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Status
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Requested,
    Approved,
    /// Physically packed at the source; no stock movement.
    Packed,
    /// Stock has left the source branch.
    Dispatched,
    Received,
    ReceivedWithDiscrepancy,
    Cancelled,
}

impl TransferStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Requested => "REQUESTED",
            TransferStatus::Approved => "APPROVED",
            TransferStatus::Packed => "PACKED",
            TransferStatus::Dispatched => "DISPATCHED",
            TransferStatus::Received => "RECEIVED",
            TransferStatus::ReceivedWithDiscrepancy => "RECEIVED_WITH_DISCREPANCY",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states accept no further transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Received
                | TransferStatus::ReceivedWithDiscrepancy
                | TransferStatus::Cancelled
        )
    }

    /// States that may follow this one.
    pub const fn allowed_next(&self) -> &'static [TransferStatus] {
        use TransferStatus::*;
        match self {
            Requested => &[Approved, Received, Cancelled],
            Approved => &[Packed, Dispatched, Received, Cancelled],
            Packed => &[Dispatched, Cancelled],
            Dispatched => &[Received, ReceivedWithDiscrepancy, Cancelled],
            Received | ReceivedWithDiscrepancy | Cancelled => &[],
        }
    }

    /// Statuses the closed-loop rule completes on restock.
    pub const AUTO_COMPLETABLE: [TransferStatus; 2] =
        [TransferStatus::Requested, TransferStatus::Approved];
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transitions
// =============================================================================

/// A workflow step applied to a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferTransition {
    Approve,
    Pack,
    Dispatch,
    Receive { discrepancy: bool },
    Cancel,
    /// Closed-loop fulfilment after a restock.
    AutoComplete,
}

impl TransferTransition {
    /// Verb used in error messages.
    pub const fn action(&self) -> &'static str {
        match self {
            TransferTransition::Approve => "approve",
            TransferTransition::Pack => "pack",
            TransferTransition::Dispatch => "dispatch",
            TransferTransition::Receive { .. } => "receive",
            TransferTransition::Cancel => "cancel",
            TransferTransition::AutoComplete => "auto-complete",
        }
    }

    /// Target status when applied to `from`, or `None` if not allowed.
    pub fn apply(&self, from: TransferStatus) -> Option<TransferStatus> {
        use TransferStatus::*;
        let to = match (self, from) {
            (TransferTransition::Approve, Requested) => Approved,
            (TransferTransition::Pack, Approved) => Packed,
            (TransferTransition::Dispatch, Approved | Packed) => Dispatched,
            (TransferTransition::Receive { discrepancy: false }, Dispatched) => Received,
            (TransferTransition::Receive { discrepancy: true }, Dispatched) => {
                ReceivedWithDiscrepancy
            }
            (TransferTransition::Cancel, s) if !s.is_terminal() => Cancelled,
            (TransferTransition::AutoComplete, Requested | Approved) => Received,
            _ => return None,
        };
        debug_assert!(from.allowed_next().contains(&to));
        Some(to)
    }
}

/// Checks a transition against the status read in the current transaction.
///
/// ```rust
/// use duka_core::transfer::{check_transition, TransferStatus, TransferTransition};
///
/// let next = check_transition("t-1", TransferStatus::Approved, TransferTransition::Dispatch).unwrap();
/// assert_eq!(next, TransferStatus::Dispatched);
///
/// // cannot skip approval
/// assert!(check_transition("t-1", TransferStatus::Requested, TransferTransition::Dispatch).is_err());
/// ```
pub fn check_transition(
    transfer_id: &str,
    current: TransferStatus,
    transition: TransferTransition,
) -> CoreResult<TransferStatus> {
    transition.apply(current).ok_or_else(|| {
        CoreError::invalid_transition("Transfer", transfer_id, current.as_str(), transition.action())
    })
}

// =============================================================================
// Rows
// =============================================================================

/// A transfer between two branches.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Transfer {
    pub id: String,
    pub transfer_number: String,
    pub from_branch_id: String,
    pub to_branch_id: String,
    pub status: TransferStatus,
    pub notes: Option<String>,
    pub requested_by: String,
    #[ts(as = "String")]
    pub requested_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,
    pub packed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub packed_at: Option<DateTime<Utc>>,
    pub dispatched_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub dispatched_at: Option<DateTime<Utc>>,
    pub parcel_tracking: Option<String>,
    pub received_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub received_at: Option<DateTime<Utc>>,
    pub discrepancy_notes: Option<String>,
    pub cancelled_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    /// Completed by the closed-loop rule rather than a physical receipt.
    pub auto_completed: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One product line of a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransferItem {
    pub id: String,
    pub transfer_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity_requested: i64,
    pub quantity_approved: Option<i64>,
    pub quantity_dispatched: Option<i64>,
    pub quantity_received: Option<i64>,
    pub discrepancy_reason: Option<String>,
    pub position: i64,
}

/// A transfer with its items.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferDetail {
    pub transfer: Transfer,
    pub items: Vec<TransferItem>,
}

// =============================================================================
// Inputs
// =============================================================================

/// Product and quantity, as requested, approved or received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferLineInput {
    pub product_id: String,
    pub quantity: i64,
}

/// A request to move stock from one branch to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewTransfer {
    pub from_branch_id: String,
    pub to_branch_id: String,
    pub items: Vec<TransferLineInput>,
    pub notes: Option<String>,
}

/// Quantity physically received for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceivedItem {
    pub product_id: String,
    pub quantity: i64,
    pub discrepancy_reason: Option<String>,
}

// =============================================================================
// Approval / Receipt Planning
// =============================================================================

/// Approved quantity per transfer item id, in item order.
///
/// Items not listed are approved at 0. Approving more than requested, or
/// listing a product the transfer does not carry, is rejected. At least one
/// item must be approved above zero.
pub fn plan_approval(
    transfer_id: &str,
    items: &[TransferItem],
    approved: &[TransferLineInput],
) -> CoreResult<Vec<(String, i64)>> {
    let by_product: HashMap<&str, i64> = approved
        .iter()
        .map(|a| (a.product_id.as_str(), a.quantity))
        .collect();

    let carried: HashSet<&str> = items.iter().map(|i| i.product_id.as_str()).collect();
    if let Some(unknown) = approved.iter().find(|a| !carried.contains(a.product_id.as_str())) {
        return Err(CoreError::UnknownTransferItem {
            transfer_id: transfer_id.to_string(),
            product_id: unknown.product_id.clone(),
        });
    }

    let mut plan = Vec::with_capacity(items.len());
    for item in items {
        let qty = by_product.get(item.product_id.as_str()).copied().unwrap_or(0);
        if qty > item.quantity_requested {
            return Err(CoreError::ApprovedExceedsRequested {
                product_id: item.product_id.clone(),
                requested: item.quantity_requested,
                approved: qty,
            });
        }
        plan.push((item.id.clone(), qty));
    }

    if plan.iter().all(|(_, qty)| *qty == 0) {
        return Err(ValidationError::MustBePositive {
            field: "approved quantity".to_string(),
        }
        .into());
    }

    Ok(plan)
}

/// One line of a receipt, resolved against the dispatched items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLine {
    pub item_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity_dispatched: i64,
    pub quantity_received: i64,
    pub discrepancy_reason: Option<String>,
}

impl ReceiptLine {
    pub fn is_discrepant(&self) -> bool {
        self.quantity_received != self.quantity_dispatched
    }
}

/// Resolved receipt of a dispatched transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptPlan {
    pub lines: Vec<ReceiptLine>,
    pub has_discrepancy: bool,
}

/// Matches received quantities against dispatched ones.
///
/// Items not listed are received at 0. Any mismatch marks the receipt as
/// discrepant, which requires non-empty notes. Received stock is credited
/// as counted either way.
pub fn plan_receipt(
    transfer_id: &str,
    items: &[TransferItem],
    received: &[ReceivedItem],
    discrepancy_notes: Option<&str>,
) -> CoreResult<ReceiptPlan> {
    let by_product: HashMap<&str, &ReceivedItem> = received
        .iter()
        .map(|r| (r.product_id.as_str(), r))
        .collect();

    let carried: HashSet<&str> = items.iter().map(|i| i.product_id.as_str()).collect();
    if let Some(unknown) = received.iter().find(|r| !carried.contains(r.product_id.as_str())) {
        return Err(CoreError::UnknownTransferItem {
            transfer_id: transfer_id.to_string(),
            product_id: unknown.product_id.clone(),
        });
    }

    let lines: Vec<ReceiptLine> = items
        .iter()
        .map(|item| {
            let entry = by_product.get(item.product_id.as_str());
            ReceiptLine {
                item_id: item.id.clone(),
                product_id: item.product_id.clone(),
                product_name: item.product_name.clone(),
                quantity_dispatched: item.quantity_dispatched.unwrap_or(0),
                quantity_received: entry.map(|r| r.quantity).unwrap_or(0),
                discrepancy_reason: entry.and_then(|r| r.discrepancy_reason.clone()),
            }
        })
        .collect();

    let has_discrepancy = lines.iter().any(ReceiptLine::is_discrepant);
    let notes_present = discrepancy_notes.map(|n| !n.trim().is_empty()).unwrap_or(false);
    if has_discrepancy && !notes_present {
        return Err(CoreError::MissingDiscrepancyNotes);
    }

    Ok(ReceiptPlan {
        lines,
        has_discrepancy,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use TransferStatus::*;

    const ALL: [TransferStatus; 7] = [
        Requested,
        Approved,
        Packed,
        Dispatched,
        Received,
        ReceivedWithDiscrepancy,
        Cancelled,
    ];

    const TRANSITIONS: [TransferTransition; 7] = [
        TransferTransition::Approve,
        TransferTransition::Pack,
        TransferTransition::Dispatch,
        TransferTransition::Receive { discrepancy: false },
        TransferTransition::Receive { discrepancy: true },
        TransferTransition::Cancel,
        TransferTransition::AutoComplete,
    ];

    fn rank(s: TransferStatus) -> u8 {
        match s {
            Requested => 0,
            Approved => 1,
            Packed => 2,
            Dispatched => 3,
            Received | ReceivedWithDiscrepancy | Cancelled => 4,
        }
    }

    fn item(product: &str, requested: i64, dispatched: Option<i64>) -> TransferItem {
        TransferItem {
            id: format!("item-{product}"),
            transfer_id: "t-1".into(),
            product_id: product.into(),
            product_name: product.to_uppercase(),
            quantity_requested: requested,
            quantity_approved: dispatched,
            quantity_dispatched: dispatched,
            quantity_received: None,
            discrepancy_reason: None,
            position: 0,
        }
    }

    fn line(product: &str, quantity: i64) -> TransferLineInput {
        TransferLineInput {
            product_id: product.into(),
            quantity,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut s = Requested;
        for t in [
            TransferTransition::Approve,
            TransferTransition::Pack,
            TransferTransition::Dispatch,
            TransferTransition::Receive { discrepancy: false },
        ] {
            s = check_transition("t-1", s, t).unwrap();
        }
        assert_eq!(s, Received);
    }

    #[test]
    fn test_pack_is_optional() {
        assert_eq!(TransferTransition::Dispatch.apply(Approved), Some(Dispatched));
        assert_eq!(TransferTransition::Dispatch.apply(Packed), Some(Dispatched));
    }

    #[test]
    fn test_dispatch_from_requested_fails() {
        let err = check_transition("t-9", Requested, TransferTransition::Dispatch).unwrap_err();
        assert_eq!(err.to_string(), "Transfer t-9 is REQUESTED, cannot dispatch");
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for s in [Received, ReceivedWithDiscrepancy, Cancelled] {
            assert!(s.is_terminal());
            for t in TRANSITIONS {
                assert_eq!(t.apply(s), None, "{s} accepted {t:?}");
            }
        }
    }

    #[test]
    fn test_status_only_moves_forward() {
        for s in ALL {
            for t in TRANSITIONS {
                if let Some(next) = t.apply(s) {
                    assert!(rank(next) > rank(s), "{s} -> {next} moved backward");
                    assert!(s.allowed_next().contains(&next));
                }
            }
        }
    }

    #[test]
    fn test_cancel_from_every_open_state() {
        for s in [Requested, Approved, Packed, Dispatched] {
            assert_eq!(TransferTransition::Cancel.apply(s), Some(Cancelled));
        }
    }

    #[test]
    fn test_auto_complete_only_before_packing() {
        assert_eq!(TransferTransition::AutoComplete.apply(Requested), Some(Received));
        assert_eq!(TransferTransition::AutoComplete.apply(Approved), Some(Received));
        assert_eq!(TransferTransition::AutoComplete.apply(Packed), None);
        assert_eq!(TransferTransition::AutoComplete.apply(Dispatched), None);
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&ReceivedWithDiscrepancy).unwrap();
        assert_eq!(json, "\"RECEIVED_WITH_DISCREPANCY\"");
    }

    #[test]
    fn test_partial_approval() {
        let items = [item("sugar", 10, None), item("salt", 4, None)];
        let plan = plan_approval("t-1", &items, &[line("sugar", 8)]).unwrap();
        assert_eq!(
            plan,
            vec![("item-sugar".to_string(), 8), ("item-salt".to_string(), 0)]
        );
    }

    #[test]
    fn test_approval_cannot_exceed_request() {
        let items = [item("sugar", 10, None)];
        let err = plan_approval("t-1", &items, &[line("sugar", 11)]).unwrap_err();
        assert!(matches!(err, CoreError::ApprovedExceedsRequested { requested: 10, approved: 11, .. }));
    }

    #[test]
    fn test_approval_rejects_unknown_product_and_all_zero() {
        let items = [item("sugar", 10, None)];
        let err = plan_approval("t-1", &items, &[line("rice", 1)]).unwrap_err();
        assert!(matches!(err, CoreError::UnknownTransferItem { .. }));

        let err = plan_approval("t-1", &items, &[line("sugar", 0)]).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_receipt_with_discrepancy_needs_notes() {
        let items = [item("sugar", 10, Some(8))];
        let received = [ReceivedItem {
            product_id: "sugar".into(),
            quantity: 7,
            discrepancy_reason: Some("one bag torn".into()),
        }];

        let err = plan_receipt("t-1", &items, &received, None).unwrap_err();
        assert_eq!(err, CoreError::MissingDiscrepancyNotes);

        let plan = plan_receipt("t-1", &items, &received, Some("short by one")).unwrap();
        assert!(plan.has_discrepancy);
        assert_eq!(plan.lines[0].quantity_received, 7);
        assert_eq!(plan.lines[0].quantity_dispatched, 8);
    }

    #[test]
    fn test_exact_receipt_is_clean() {
        let items = [item("sugar", 10, Some(8)), item("salt", 3, Some(0))];
        let received = [ReceivedItem {
            product_id: "sugar".into(),
            quantity: 8,
            discrepancy_reason: None,
        }];
        // salt was approved at zero and is implicitly received at zero
        let plan = plan_receipt("t-1", &items, &received, None).unwrap();
        assert!(!plan.has_discrepancy);
    }
}
