//! # Sale Rules
//!
//! The arithmetic half of the sale engine: totals, price floor, payment
//! reconciliation and credit classification. The storage half (stock
//! deduction, persistence) lives in `duka-db`.
//!
//! ## Checks in Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  per line:  unit_price >= product.min_price        (BelowMinimumPrice)  │
//! │  subtotal = Σ unit_price × quantity                                     │
//! │  total    = subtotal − discount >= 0               (DiscountExceeds…)   │
//! │  |Σ payments − total| <= 0.01                      (PaymentMismatch)    │
//! │  any CREDIT payment ⇒ customer name + phone        (MissingCredit…)     │
//! │  credit_status = PENDING if credit covers total, else PARTIAL           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CreditStatus, PaymentMethod};
use crate::PAYMENT_TOLERANCE;

// =============================================================================
// Inputs
// =============================================================================

/// One requested sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineInput {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
}

/// One tendered payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentInput {
    pub method: PaymentMethod,
    pub amount: Money,
    pub reference: Option<String>,
}

impl PaymentInput {
    pub fn new(method: PaymentMethod, amount: Money) -> Self {
        PaymentInput {
            method,
            amount,
            reference: None,
        }
    }
}

/// Everything a till submits to create a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub branch_id: String,
    pub items: Vec<SaleLineInput>,
    pub payments: Vec<PaymentInput>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub discount: Money,
}

// =============================================================================
// Totals
// =============================================================================

/// Computed monetary totals of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
}

/// Line total for `quantity` units at `unit_price`.
#[inline]
pub fn line_total(unit_price: Money, quantity: i64) -> CoreResult<Money> {
    unit_price
        .checked_multiply_quantity(quantity)
        .ok_or_else(|| overflow("line total"))
}

fn overflow(what: &str) -> CoreError {
    CoreError::AmountOverflow {
        what: what.to_string(),
    }
}

/// Computes subtotal and total.
///
/// ```rust
/// use duka_core::money::Money;
/// use duka_core::sale::compute_totals;
///
/// let lines = [(Money::from_major(250), 2), (Money::from_major(500), 1)];
/// let totals = compute_totals(&lines, Money::from_major(100)).unwrap();
/// assert_eq!(totals.subtotal, Money::from_major(1000));
/// assert_eq!(totals.total, Money::from_major(900));
/// ```
pub fn compute_totals(lines: &[(Money, i64)], discount: Money) -> CoreResult<SaleTotals> {
    let line_totals = lines
        .iter()
        .map(|(unit_price, qty)| line_total(*unit_price, *qty))
        .collect::<CoreResult<Vec<Money>>>()?;
    let subtotal = Money::checked_sum(line_totals).ok_or_else(|| overflow("subtotal"))?;

    let total = subtotal.checked_sub(discount).ok_or_else(|| overflow("total"))?;
    if total.is_negative() {
        return Err(CoreError::DiscountExceedsSubtotal { discount, subtotal });
    }

    Ok(SaleTotals {
        subtotal,
        discount,
        total,
    })
}

/// Rejects a unit price below the product's floor.
pub fn check_price_floor(product_name: &str, unit_price: Money, min_price: Money) -> CoreResult<()> {
    if unit_price < min_price {
        return Err(CoreError::BelowMinimumPrice {
            product: product_name.to_string(),
            unit_price,
            min_price,
        });
    }
    Ok(())
}

// =============================================================================
// Payment Reconciliation
// =============================================================================

/// Checks that the payments add up to `total` within 0.01 and returns the sum.
pub fn reconcile_payments(total: Money, payments: &[PaymentInput]) -> CoreResult<Money> {
    let paid = Money::checked_sum(payments.iter().map(|p| p.amount))
        .ok_or_else(|| overflow("payment total"))?;

    if !paid.within(total, PAYMENT_TOLERANCE) {
        let difference = total
            .checked_sub(paid)
            .ok_or_else(|| overflow("payment difference"))?;
        return Err(CoreError::PaymentMismatch {
            total,
            paid,
            difference,
        });
    }

    Ok(paid)
}

// =============================================================================
// Credit Classification
// =============================================================================

/// Whether a sale carries debt, and how much of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditClassification {
    pub is_credit: bool,
    pub credit_status: Option<CreditStatus>,
    /// Sum of the CREDIT payment rows.
    pub credit_amount: Money,
}

/// Classifies a sale from its payments.
///
/// A sale with any CREDIT payment is a credit sale and must name the customer.
/// It starts PENDING when the credit portion covers the whole total and
/// PARTIAL when a CASH/MPESA payment already covers part of it.
pub fn classify_credit(
    total: Money,
    payments: &[PaymentInput],
    customer_name: Option<&str>,
    customer_phone: Option<&str>,
) -> CoreResult<CreditClassification> {
    let credit_amount = Money::checked_sum(
        payments
            .iter()
            .filter(|p| p.method == PaymentMethod::Credit)
            .map(|p| p.amount),
    )
    .ok_or_else(|| overflow("credit amount"))?;
    let has_credit = payments.iter().any(|p| p.method == PaymentMethod::Credit);

    if !has_credit {
        return Ok(CreditClassification {
            is_credit: false,
            credit_status: None,
            credit_amount: Money::zero(),
        });
    }

    let present = |v: Option<&str>| v.map(|s| !s.trim().is_empty()).unwrap_or(false);
    if !present(customer_name) || !present(customer_phone) {
        return Err(CoreError::MissingCreditCustomerInfo);
    }

    let status = if credit_amount.within(total, PAYMENT_TOLERANCE) {
        CreditStatus::Pending
    } else {
        CreditStatus::Partial
    };

    Ok(CreditClassification {
        is_credit: true,
        credit_status: Some(status),
        credit_amount,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pay(method: PaymentMethod, major: i64) -> PaymentInput {
        PaymentInput::new(method, Money::from_major(major))
    }

    #[test]
    fn test_totals_with_discount() {
        let totals = compute_totals(&[(Money::from_major(100), 3)], Money::from_major(50)).unwrap();
        assert_eq!(totals.subtotal, Money::from_major(300));
        assert_eq!(totals.total, Money::from_major(250));
    }

    #[test]
    fn test_discount_cannot_exceed_subtotal() {
        let err = compute_totals(&[(Money::from_major(100), 1)], Money::from_major(101)).unwrap_err();
        assert!(matches!(err, CoreError::DiscountExceedsSubtotal { .. }));

        // discount equal to subtotal gives a zero total, which is allowed
        let totals = compute_totals(&[(Money::from_major(100), 1)], Money::from_major(100)).unwrap();
        assert!(totals.total.is_zero());
    }

    #[test]
    fn test_oversized_lines_are_rejected_not_wrapped() {
        let err = compute_totals(&[(Money::from_cents(i64::MAX / 2 + 1), 2)], Money::zero()).unwrap_err();
        assert_eq!(err, CoreError::AmountOverflow { what: "line total".into() });

        let half = Money::from_cents(i64::MAX / 2 + 1);
        let err = compute_totals(&[(half, 1), (half, 1)], Money::zero()).unwrap_err();
        assert_eq!(err, CoreError::AmountOverflow { what: "subtotal".into() });
    }

    #[test]
    fn test_price_floor() {
        assert!(check_price_floor("Sugar", Money::from_major(160), Money::from_major(160)).is_ok());
        let err = check_price_floor("Sugar", Money::from_major(150), Money::from_major(160)).unwrap_err();
        match err {
            CoreError::BelowMinimumPrice { product, min_price, .. } => {
                assert_eq!(product, "Sugar");
                assert_eq!(min_price, Money::from_major(160));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reconcile_split_tender() {
        let payments = [pay(PaymentMethod::Cash, 600), pay(PaymentMethod::Mpesa, 400)];
        let paid = reconcile_payments(Money::from_major(1000), &payments).unwrap();
        assert_eq!(paid, Money::from_major(1000));
    }

    #[test]
    fn test_reconcile_tolerates_one_cent() {
        let payments = [PaymentInput::new(PaymentMethod::Cash, Money::from_cents(99_999))];
        assert!(reconcile_payments(Money::from_major(1000), &payments).is_ok());
    }

    #[test]
    fn test_reconcile_names_difference() {
        let payments = [pay(PaymentMethod::Cash, 900)];
        let err = reconcile_payments(Money::from_major(1000), &payments).unwrap_err();
        assert_eq!(
            err,
            CoreError::PaymentMismatch {
                total: Money::from_major(1000),
                paid: Money::from_major(900),
                difference: Money::from_major(100),
            }
        );
    }

    #[test]
    fn test_reconcile_rejects_payments_that_overflow() {
        // would wrap back to 250.02 without checked addition
        let payments = [
            PaymentInput::new(PaymentMethod::Cash, Money::from_cents(i64::MAX)),
            PaymentInput::new(PaymentMethod::Mpesa, Money::from_cents(i64::MAX)),
            PaymentInput::new(PaymentMethod::Cash, Money::from_cents(25_002)),
        ];
        let err = reconcile_payments(Money::from_major(250), &payments).unwrap_err();
        assert_eq!(err, CoreError::AmountOverflow { what: "payment total".into() });
    }

    #[test]
    fn test_non_credit_sale_has_no_status() {
        let payments = [pay(PaymentMethod::Cash, 600), pay(PaymentMethod::Mpesa, 400)];
        let c = classify_credit(Money::from_major(1000), &payments, None, None).unwrap();
        assert!(!c.is_credit);
        assert_eq!(c.credit_status, None);
    }

    #[test]
    fn test_partial_credit() {
        let payments = [pay(PaymentMethod::Cash, 300), pay(PaymentMethod::Credit, 700)];
        let c = classify_credit(
            Money::from_major(1000),
            &payments,
            Some("Jane"),
            Some("0712345678"),
        )
        .unwrap();
        assert!(c.is_credit);
        assert_eq!(c.credit_status, Some(CreditStatus::Partial));
        assert_eq!(c.credit_amount, Money::from_major(700));
    }

    #[test]
    fn test_full_credit_is_pending() {
        let payments = [pay(PaymentMethod::Credit, 1000)];
        let c = classify_credit(Money::from_major(1000), &payments, Some("Jane"), Some("0712")).unwrap();
        assert_eq!(c.credit_status, Some(CreditStatus::Pending));
    }

    #[test]
    fn test_credit_requires_customer() {
        let payments = [pay(PaymentMethod::Credit, 1000)];
        let err = classify_credit(Money::from_major(1000), &payments, Some("Jane"), Some("  "))
            .unwrap_err();
        assert_eq!(err, CoreError::MissingCreditCustomerInfo);
    }
}
