//! # Inventory Rules
//!
//! The pure half of the Inventory Guard. Version-checked updates happen in
//! `duka-db`; this module decides stock sufficiency and low-stock status.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

/// A product at or below its threshold at one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LowStockItem {
    pub product_id: String,
    pub product_name: String,
    pub branch_id: String,
    pub quantity: i64,
    pub threshold: i64,
}

/// Threshold for a product at a branch: branch override, else product default.
#[inline]
pub fn resolve_threshold(branch_override: Option<i64>, product_default: i64) -> i64 {
    branch_override.unwrap_or(product_default)
}

/// True when stock has fallen to or below the threshold.
///
/// ```rust
/// use duka_core::inventory::low_stock_check;
///
/// assert!(low_stock_check(5, 5));
/// assert!(!low_stock_check(6, 5));
/// ```
#[inline]
pub fn low_stock_check(quantity: i64, threshold: i64) -> bool {
    quantity <= threshold
}

/// Rejects a deduction larger than what is on hand.
pub fn ensure_available(product: &str, available: i64, requested: i64) -> CoreResult<()> {
    if available < requested {
        return Err(CoreError::InsufficientStock {
            product: product.to_string(),
            available,
            requested,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_override_wins() {
        assert_eq!(resolve_threshold(Some(2), 10), 2);
        assert_eq!(resolve_threshold(None, 10), 10);
    }

    #[test]
    fn test_low_stock_uses_branch_override() {
        assert!(low_stock_check(8, resolve_threshold(None, 10)));
        assert!(!low_stock_check(8, resolve_threshold(Some(5), 10)));
        assert!(low_stock_check(5, resolve_threshold(Some(5), 10)));
    }

    #[test]
    fn test_ensure_available() {
        assert!(ensure_available("Unga 2kg", 3, 3).is_ok());
        let err = ensure_available("Unga 2kg", 3, 5).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                product: "Unga 2kg".into(),
                available: 3,
                requested: 5,
            }
        );
    }
}
