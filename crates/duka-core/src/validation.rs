//! # Validation Module
//!
//! Input validation run before any transaction is opened.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Engine entry point                                           │
//! │  ├── THIS MODULE: shape of the input (empty, negative, too long)       │
//! │  └── ValidationError, nothing touched                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Inside the transaction                                       │
//! │  ├── Business rules against stored state (price floor, stock, …)       │
//! │  └── CoreError, transaction rolled back                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0)                                             │
//! │  ├── UNIQUE (product_id, branch_id), receipt/transfer numbers          │
//! │  └── Append-only triggers                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use duka_core::validation::{validate_quantity, validate_required};
//!
//! validate_required("reason", "customer returned goods").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::money::Money;
use crate::sale::NewSale;
use crate::transfer::{NewTransfer, ReceivedItem, TransferLineInput};
use crate::{MAX_AMOUNT, MAX_ITEM_QUANTITY, MAX_SALE_ITEMS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest free-text field accepted (reasons, notes).
pub const MAX_TEXT_LEN: usize = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Validates that a field is present and not blank.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates free text (reasons, notes): required and bounded.
pub fn validate_text(field: &str, value: &str) -> ValidationResult<()> {
    validate_required(field, value)?;
    if value.trim().chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LEN,
        });
    }
    Ok(())
}

/// Validates optional free text: bounded when present.
pub fn validate_optional_text(field: &str, value: Option<&str>) -> ValidationResult<()> {
    match value {
        Some(v) if v.chars().count() > MAX_TEXT_LEN => Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LEN,
        }),
        _ => Ok(()),
    }
}

/// Validates a customer phone number.
///
/// ## Rules
/// - Optional leading `+`
/// - Digits, spaces and hyphens otherwise
/// - Between 7 and 15 digits
///
/// ## Example
/// ```rust
/// use duka_core::validation::validate_customer_phone;
///
/// assert!(validate_customer_phone("0712345678").is_ok());
/// assert!(validate_customer_phone("+254 712 345 678").is_ok());
/// assert!(validate_customer_phone("call me").is_err());
/// ```
pub fn validate_customer_phone(phone: &str) -> ValidationResult<()> {
    let phone = phone.trim();
    validate_required("customer_phone", phone)?;

    let body = phone.strip_prefix('+').unwrap_or(phone);
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "customer_phone".to_string(),
            reason: "must contain only digits, spaces and hyphens".to_string(),
        });
    }

    let digits = body.chars().filter(char::is_ascii_digit).count();
    if !(7..=15).contains(&digits) {
        return Err(ValidationError::InvalidFormat {
            field: "customer_phone".to_string(),
            reason: "must have between 7 and 15 digits".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity value.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (9999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a quantity that may legitimately be zero (approved, received).
pub fn validate_counted_quantity(field: &str, qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a non-negative money amount (prices, discounts).
///
/// ```rust
/// use duka_core::money::Money;
/// use duka_core::validation::validate_non_negative;
///
/// assert!(validate_non_negative("discount", Money::zero()).is_ok());
/// assert!(validate_non_negative("discount", Money::from_cents(-1)).is_err());
/// ```
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a payment amount: must be positive.
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }
    check_ceiling("payment amount", amount, 1)
}

/// Validates a price or discount: non-negative and at most [`MAX_AMOUNT`].
///
/// ```rust
/// use duka_core::money::Money;
/// use duka_core::validation::validate_amount;
///
/// assert!(validate_amount("unit_price", Money::from_major(250)).is_ok());
/// assert!(validate_amount("unit_price", Money::from_cents(i64::MAX)).is_err());
/// ```
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    validate_non_negative(field, amount)?;
    check_ceiling(field, amount, 0)
}

fn check_ceiling(field: &str, amount: Money, min: i64) -> ValidationResult<()> {
    if amount > MAX_AMOUNT {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max: MAX_AMOUNT.cents(),
        });
    }
    Ok(())
}

// =============================================================================
// Request Validators
// =============================================================================

/// Validates the shape of a sale before any transaction starts.
///
/// Business rules that need stored state (price floor, stock, payment sum)
/// are checked later, inside the transaction.
pub fn validate_new_sale(sale: &NewSale) -> ValidationResult<()> {
    validate_required("branch_id", &sale.branch_id)?;

    if sale.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    if sale.items.len() > MAX_SALE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_ITEMS as i64,
        });
    }
    for item in &sale.items {
        validate_required("product_id", &item.product_id)?;
        validate_quantity(item.quantity)?;
        validate_amount("unit_price", item.unit_price)?;
    }

    if sale.payments.is_empty() {
        return Err(ValidationError::Required {
            field: "payments".to_string(),
        });
    }
    for payment in &sale.payments {
        validate_payment_amount(payment.amount)?;
        validate_optional_text("reference", payment.reference.as_deref())?;
    }

    validate_amount("discount", sale.discount)?;

    if let Some(phone) = sale.customer_phone.as_deref().filter(|p| !p.trim().is_empty()) {
        validate_customer_phone(phone)?;
    }
    validate_optional_text("customer_name", sale.customer_name.as_deref())?;

    Ok(())
}

/// Validates a transfer request.
pub fn validate_new_transfer(transfer: &NewTransfer) -> ValidationResult<()> {
    validate_required("from_branch_id", &transfer.from_branch_id)?;
    validate_required("to_branch_id", &transfer.to_branch_id)?;
    if transfer.from_branch_id == transfer.to_branch_id {
        return Err(ValidationError::MustDiffer {
            field: "to_branch_id".to_string(),
            other: "from_branch_id".to_string(),
        });
    }

    if transfer.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    ensure_unique(transfer.items.iter().map(|i| i.product_id.as_str()))?;
    for item in &transfer.items {
        validate_required("product_id", &item.product_id)?;
        validate_quantity(item.quantity)?;
    }

    validate_optional_text("notes", transfer.notes.as_deref())
}

/// Validates approved quantities (zero allowed per line).
pub fn validate_approved_items(items: &[TransferLineInput]) -> ValidationResult<()> {
    ensure_unique(items.iter().map(|i| i.product_id.as_str()))?;
    for item in items {
        validate_required("product_id", &item.product_id)?;
        validate_counted_quantity("approved quantity", item.quantity)?;
    }
    Ok(())
}

/// Validates received quantities (zero allowed per line).
pub fn validate_received_items(items: &[ReceivedItem]) -> ValidationResult<()> {
    ensure_unique(items.iter().map(|i| i.product_id.as_str()))?;
    for item in items {
        validate_required("product_id", &item.product_id)?;
        validate_counted_quantity("received quantity", item.quantity)?;
        validate_optional_text("discrepancy_reason", item.discrepancy_reason.as_deref())?;
    }
    Ok(())
}

fn ensure_unique<'a>(ids: impl Iterator<Item = &'a str>) -> ValidationResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ValidationError::Duplicate {
                field: "product_id".to_string(),
                value: id.to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sale::{PaymentInput, SaleLineInput};
    use crate::types::PaymentMethod;

    fn sale() -> NewSale {
        NewSale {
            branch_id: "b-1".into(),
            items: vec![SaleLineInput {
                product_id: "p-1".into(),
                quantity: 2,
                unit_price: Money::from_major(500),
            }],
            payments: vec![PaymentInput::new(PaymentMethod::Cash, Money::from_major(1000))],
            customer_name: None,
            customer_phone: None,
            discount: Money::zero(),
        }
    }

    fn transfer() -> NewTransfer {
        NewTransfer {
            from_branch_id: "b-1".into(),
            to_branch_id: "b-2".into(),
            items: vec![TransferLineInput {
                product_id: "p-1".into(),
                quantity: 10,
            }],
            notes: None,
        }
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_counted_quantity_allows_zero() {
        assert!(validate_counted_quantity("received quantity", 0).is_ok());
        assert!(validate_counted_quantity("received quantity", -1).is_err());
    }

    #[test]
    fn test_validate_text() {
        assert!(validate_text("reason", "wrong item scanned").is_ok());
        assert!(validate_text("reason", "   ").is_err());
        assert!(validate_text("reason", &"x".repeat(MAX_TEXT_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_customer_phone() {
        assert!(validate_customer_phone("0712345678").is_ok());
        assert!(validate_customer_phone("+254-712-345678").is_ok());
        assert!(validate_customer_phone("12345").is_err());
        assert!(validate_customer_phone("07123abc").is_err());
    }

    #[test]
    fn test_valid_sale_passes() {
        assert!(validate_new_sale(&sale()).is_ok());
    }

    #[test]
    fn test_sale_without_items_or_payments() {
        let mut s = sale();
        s.items.clear();
        assert_eq!(
            validate_new_sale(&s),
            Err(ValidationError::Required {
                field: "items".into()
            })
        );

        let mut s = sale();
        s.payments.clear();
        assert_eq!(
            validate_new_sale(&s),
            Err(ValidationError::Required {
                field: "payments".into()
            })
        );
    }

    #[test]
    fn test_sale_rejects_zero_payment_and_negative_discount() {
        let mut s = sale();
        s.payments.push(PaymentInput::new(PaymentMethod::Mpesa, Money::zero()));
        assert!(validate_new_sale(&s).is_err());

        let mut s = sale();
        s.discount = Money::from_cents(-100);
        assert!(validate_new_sale(&s).is_err());
    }

    #[test]
    fn test_sale_rejects_amounts_above_ceiling() {
        let ceiling = ValidationError::OutOfRange {
            field: "payment amount".into(),
            min: 1,
            max: MAX_AMOUNT.cents(),
        };

        let mut s = sale();
        s.payments = vec![
            PaymentInput::new(PaymentMethod::Cash, Money::from_cents(i64::MAX)),
            PaymentInput::new(PaymentMethod::Mpesa, Money::from_cents(i64::MAX)),
            PaymentInput::new(PaymentMethod::Cash, Money::from_cents(25_002)),
        ];
        assert_eq!(validate_new_sale(&s), Err(ceiling.clone()));
        assert_eq!(validate_payment_amount(Money::from_cents(i64::MAX)), Err(ceiling));

        let mut s = sale();
        s.items[0].unit_price = Money::from_cents(i64::MAX / 2 + 1);
        assert!(matches!(
            validate_new_sale(&s),
            Err(ValidationError::OutOfRange { ref field, .. }) if field == "unit_price"
        ));

        let mut s = sale();
        s.discount = MAX_AMOUNT + Money::from_cents(1);
        assert!(matches!(
            validate_new_sale(&s),
            Err(ValidationError::OutOfRange { ref field, .. }) if field == "discount"
        ));

        // the ceiling itself is accepted
        let mut s = sale();
        s.items[0].quantity = 1;
        s.items[0].unit_price = MAX_AMOUNT;
        s.payments = vec![PaymentInput::new(PaymentMethod::Cash, MAX_AMOUNT)];
        assert!(validate_new_sale(&s).is_ok());
    }

    #[test]
    fn test_sale_may_repeat_a_product() {
        let mut s = sale();
        s.items.push(s.items[0].clone());
        assert!(validate_new_sale(&s).is_ok());
    }

    #[test]
    fn test_transfer_branches_must_differ() {
        let mut t = transfer();
        t.to_branch_id = "b-1".into();
        assert!(matches!(
            validate_new_transfer(&t),
            Err(ValidationError::MustDiffer { .. })
        ));
    }

    #[test]
    fn test_transfer_rejects_duplicate_products() {
        let mut t = transfer();
        t.items.push(t.items[0].clone());
        assert!(matches!(
            validate_new_transfer(&t),
            Err(ValidationError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_received_items() {
        let items = [ReceivedItem {
            product_id: "p-1".into(),
            quantity: 0,
            discrepancy_reason: Some("lost in transit".into()),
        }];
        assert!(validate_received_items(&items).is_ok());
    }
}
