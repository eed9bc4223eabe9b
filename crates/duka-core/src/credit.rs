//! # Credit Ledger Rules
//!
//! ```text
//! balance = total − Σ(payments where method != CREDIT) − Σ(credit_payments)
//! ```
//!
//! The CREDIT payment row written with the sale records the debt itself,
//! not money received, so it is left out. Only CASH/MPESA payments at the
//! till and later settlement events reduce the balance.

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CreditStatus, Payment, PaymentMethod};
use crate::validation::validate_payment_amount;
use crate::CREDIT_TOLERANCE;

/// Outstanding debt from the three components of the balance formula.
#[inline]
pub fn credit_balance(total: Money, received_at_sale: Money, settled: Money) -> Money {
    total - received_at_sale - settled
}

/// Sum of the payments recorded with a sale that were money actually received.
pub fn received_at_sale(payments: &[Payment]) -> Money {
    payments
        .iter()
        .filter(|p| p.method.is_money_received())
        .map(Payment::amount)
        .sum()
}

/// Settlement status for a balance: PAID strictly below 1.00, else PARTIAL.
#[inline]
pub fn status_for_balance(balance: Money) -> CreditStatus {
    if balance < CREDIT_TOLERANCE {
        CreditStatus::Paid
    } else {
        CreditStatus::Partial
    }
}

/// Validates a settlement against the current balance and returns the new
/// balance and status.
///
/// ```rust
/// use duka_core::credit::apply_settlement;
/// use duka_core::money::Money;
/// use duka_core::types::{CreditStatus, PaymentMethod};
///
/// let (balance, status) =
///     apply_settlement(Money::from_major(700), Money::from_major(700), PaymentMethod::Cash).unwrap();
/// assert!(balance.is_zero());
/// assert_eq!(status, CreditStatus::Paid);
/// ```
pub fn apply_settlement(
    balance: Money,
    amount: Money,
    method: PaymentMethod,
) -> CoreResult<(Money, CreditStatus)> {
    if method == PaymentMethod::Credit {
        return Err(crate::error::ValidationError::NotAllowed {
            field: "method".to_string(),
            allowed: vec!["CASH".to_string(), "MPESA".to_string()],
        }
        .into());
    }

    validate_payment_amount(amount)?;

    if amount > balance + CREDIT_TOLERANCE {
        return Err(CoreError::Overpayment { amount, balance });
    }

    let new_balance = balance
        .checked_sub(amount)
        .ok_or_else(|| CoreError::AmountOverflow {
            what: "credit balance".to_string(),
        })?;
    Ok((new_balance, status_for_balance(new_balance)))
}

// =============================================================================
// Unit Tests
// =============================================================================
