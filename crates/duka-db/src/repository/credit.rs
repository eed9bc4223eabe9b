//! # Credit Repository
//!
//! Settlement of credit sales ("deni").
//!
//! The balance is never cached: every settlement recomputes it from the
//! sale's payments and prior settlements inside its own transaction.
//!
//! Recording a settlement is not idempotent. Each call is a new event, so a
//! caller that timed out must read the balance before trying again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;
use ts_rs::TS;

use duka_core::credit::apply_settlement;
use duka_core::{
    Actor, AuditAction, CoreError, CreditPayment, CreditStatus, EntityType, Money, NewAuditEntry,
    PaymentMethod, Sale,
};

use super::sale::{balance_of, fetch_credit_payments, fetch_payments, require_sale};
use super::{audit, new_id};
use crate::error::DbResult;

/// Result of one settlement.
#[derive(Debug, Clone)]
pub struct CreditSettlement {
    /// The sale after its status update.
    pub sale: Sale,
    pub payment: CreditPayment,
    pub balance_before: Money,
    pub balance: Money,
}

/// A credit sale that still carries debt.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OutstandingCredit {
    pub sale_id: String,
    pub receipt_number: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub credit_status: Option<CreditStatus>,
    pub total: Money,
    pub balance: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Repository for credit settlements.
#[derive(Debug, Clone)]
pub struct CreditRepository {
    pool: SqlitePool,
}

impl CreditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CreditRepository { pool }
    }

    /// Records a settlement against a credit sale.
    ///
    /// ## Rejected When
    /// - the sale was reversed
    /// - the sale is not a credit sale
    /// - the sale is already PAID
    /// - `amount` exceeds the balance by more than 1.00 (`Overpayment`)
    /// - `method` is CREDIT
    pub async fn record_payment(
        &self,
        sale_id: &str,
        amount: Money,
        method: PaymentMethod,
        actor: &Actor,
    ) -> DbResult<CreditSettlement> {
        let mut tx = self.pool.begin().await?;

        let sale = require_sale(&mut tx, sale_id).await?;
        if sale.is_reversed {
            return Err(CoreError::invalid_transition("Sale", sale_id, "REVERSED", "record credit payment").into());
        }
        if !sale.is_credit {
            return Err(CoreError::NotCreditSale(sale_id.to_string()).into());
        }
        if sale.credit_status == Some(CreditStatus::Paid) {
            return Err(CoreError::invalid_transition("Sale", sale_id, "PAID", "record credit payment").into());
        }

        let payments = fetch_payments(&mut tx, sale_id).await?;
        let settled = fetch_credit_payments(&mut tx, sale_id).await?;
        let balance_before = balance_of(&sale, &payments, &settled);

        let (balance, status) = apply_settlement(balance_before, amount, method)?;

        let payment = CreditPayment {
            id: new_id(),
            sale_id: sale_id.to_string(),
            amount_cents: amount.cents(),
            method,
            received_by: actor.user_id.clone(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO credit_payments (id, sale_id, amount_cents, method, received_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.sale_id)
        .bind(payment.amount_cents)
        .bind(payment.method)
        .bind(&payment.received_by)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE sales SET credit_status = ?2 WHERE id = ?1")
            .bind(sale_id)
            .bind(status)
            .execute(&mut *tx)
            .await?;

        audit::append(
            &mut tx,
            &NewAuditEntry::new(
                &actor.user_id,
                AuditAction::CreditPaymentRecorded,
                EntityType::Sale,
                sale_id,
            )
            .with_old(json!({
                "credit_status": sale.credit_status,
                "balance_cents": balance_before.cents(),
            }))
            .with_new(json!({
                "credit_payment_id": payment.id,
                "amount_cents": payment.amount_cents,
                "method": payment.method,
                "credit_status": status,
                "balance_cents": balance.cents(),
            })),
        )
        .await?;

        let sale = require_sale(&mut tx, sale_id).await?;
        tx.commit().await?;

        info!(
            sale_id,
            amount = %amount,
            balance = %balance,
            status = status.as_str(),
            "Credit payment recorded"
        );

        Ok(CreditSettlement {
            sale,
            payment,
            balance_before,
            balance,
        })
    }

    /// Current outstanding balance of a sale; zero for non-credit sales.
    pub async fn balance(&self, sale_id: &str) -> DbResult<Money> {
        let mut conn = self.pool.acquire().await?;
        let sale = require_sale(&mut conn, sale_id).await?;
        let payments = fetch_payments(&mut conn, sale_id).await?;
        let settled = fetch_credit_payments(&mut conn, sale_id).await?;
        Ok(balance_of(&sale, &payments, &settled))
    }

    /// Unsettled, unreversed credit sales at a branch, oldest first.
    pub async fn list_outstanding(&self, branch_id: &str) -> DbResult<Vec<OutstandingCredit>> {
        let rows: Vec<(String, String, Option<String>, Option<String>, Option<CreditStatus>, i64, i64, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT s.id, s.receipt_number, s.customer_name, s.customer_phone, s.credit_status,
                       s.total_cents,
                       s.total_cents
                         - COALESCE((SELECT SUM(p.amount_cents) FROM payments p
                                     WHERE p.sale_id = s.id AND p.method <> 'CREDIT'), 0)
                         - COALESCE((SELECT SUM(c.amount_cents) FROM credit_payments c
                                     WHERE c.sale_id = s.id), 0) AS balance_cents,
                       s.created_at
                FROM sales s
                WHERE s.branch_id = ?1
                  AND s.is_credit = 1
                  AND s.is_reversed = 0
                  AND s.credit_status <> 'PAID'
                ORDER BY s.created_at, s.rowid
                "#,
            )
            .bind(branch_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(sale_id, receipt_number, customer_name, customer_phone, credit_status, total, balance, created_at)| {
                    OutstandingCredit {
                        sale_id,
                        receipt_number,
                        customer_name,
                        customer_phone,
                        credit_status,
                        total: Money::from_cents(total),
                        balance: Money::from_cents(balance),
                        created_at,
                    }
                },
            )
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{self, cashier, manager, NAIROBI, UNGA};
    use crate::Database;
    use duka_core::{NewSale, PaymentInput, SaleLineInput, ValidationError};

    /// Scenario B: 1000 total, 300 cash, 700 credit.
    async fn credit_sale(db: &Database) -> Sale {
        let sale = NewSale {
            branch_id: NAIROBI.to_string(),
            items: vec![SaleLineInput {
                product_id: UNGA.to_string(),
                quantity: 4,
                unit_price: Money::from_major(250),
            }],
            payments: vec![
                PaymentInput::new(PaymentMethod::Cash, Money::from_major(300)),
                PaymentInput::new(PaymentMethod::Credit, Money::from_major(700)),
            ],
            customer_name: Some("Jane".into()),
            customer_phone: Some("0712345678".into()),
            discount: Money::zero(),
        };
        db.sales().create_sale(&sale, &cashier()).await.unwrap().detail.sale
    }

    #[tokio::test]
    async fn test_full_settlement_marks_paid() {
        let db = fixtures::stocked(0, 10).await;
        let sale = credit_sale(&db).await;

        let settlement = db
            .credit()
            .record_payment(&sale.id, Money::from_major(700), PaymentMethod::Cash, &manager())
            .await
            .unwrap();
        assert_eq!(settlement.balance_before, Money::from_major(700));
        assert!(settlement.balance.is_zero());
        assert_eq!(settlement.sale.credit_status, Some(CreditStatus::Paid));
        assert!(db.credit().list_outstanding(NAIROBI).await.unwrap().is_empty());

        // nothing more to collect
        let err = db
            .credit()
            .record_payment(&sale.id, Money::from_major(1), PaymentMethod::Cash, &manager())
            .await
            .unwrap_err();
        assert!(matches!(err.as_rule(), Some(CoreError::InvalidStateTransition { .. })));
    }

    #[tokio::test]
    async fn test_balance_monotonic_and_paid_only_below_one() {
        let db = fixtures::stocked(0, 10).await;
        let sale = credit_sale(&db).await;

        let first = db
            .credit()
            .record_payment(&sale.id, Money::from_major(500), PaymentMethod::Mpesa, &manager())
            .await
            .unwrap();
        assert_eq!(first.balance, Money::from_major(200));
        assert_eq!(first.sale.credit_status, Some(CreditStatus::Partial));

        // leaves exactly 1.00: still PARTIAL
        let second = db
            .credit()
            .record_payment(&sale.id, Money::from_major(199), PaymentMethod::Cash, &manager())
            .await
            .unwrap();
        assert_eq!(second.balance, Money::from_major(1));
        assert_eq!(second.sale.credit_status, Some(CreditStatus::Partial));
        assert!(second.balance < first.balance);

        let third = db
            .credit()
            .record_payment(&sale.id, Money::from_cents(50), PaymentMethod::Cash, &manager())
            .await
            .unwrap();
        assert_eq!(third.balance, Money::from_cents(50));
        assert_eq!(third.sale.credit_status, Some(CreditStatus::Paid));
        assert_eq!(db.credit().balance(&sale.id).await.unwrap(), Money::from_cents(50));
    }

    #[tokio::test]
    async fn test_overpayment_rejected() {
        let db = fixtures::stocked(0, 10).await;
        let sale = credit_sale(&db).await;

        let err = db
            .credit()
            .record_payment(&sale.id, Money::from_cents(70_101), PaymentMethod::Cash, &manager())
            .await
            .unwrap_err();
        assert!(matches!(err.as_rule(), Some(CoreError::Overpayment { .. })));

        // within tolerance is accepted
        let settlement = db
            .credit()
            .record_payment(&sale.id, Money::from_cents(70_100), PaymentMethod::Cash, &manager())
            .await
            .unwrap();
        assert_eq!(settlement.sale.credit_status, Some(CreditStatus::Paid));
    }

    #[tokio::test]
    async fn test_credit_method_not_a_settlement() {
        let db = fixtures::stocked(0, 10).await;
        let sale = credit_sale(&db).await;

        let err = db
            .credit()
            .record_payment(&sale.id, Money::from_major(100), PaymentMethod::Credit, &manager())
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_rule(),
            Some(CoreError::Validation(ValidationError::NotAllowed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_non_credit_sale_rejected() {
        let db = fixtures::stocked(0, 10).await;
        let sale = NewSale {
            branch_id: NAIROBI.to_string(),
            items: vec![SaleLineInput {
                product_id: UNGA.to_string(),
                quantity: 1,
                unit_price: Money::from_major(250),
            }],
            payments: vec![PaymentInput::new(PaymentMethod::Cash, Money::from_major(250))],
            customer_name: None,
            customer_phone: None,
            discount: Money::zero(),
        };
        let sale = db.sales().create_sale(&sale, &cashier()).await.unwrap().detail.sale;

        let err = db
            .credit()
            .record_payment(&sale.id, Money::from_major(10), PaymentMethod::Cash, &manager())
            .await
            .unwrap_err();
        assert!(matches!(err.as_rule(), Some(CoreError::NotCreditSale(_))));
    }

    #[tokio::test]
    async fn test_outstanding_lists_balance() {
        let db = fixtures::stocked(0, 10).await;
        let sale = credit_sale(&db).await;

        let outstanding = db.credit().list_outstanding(NAIROBI).await.unwrap();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].sale_id, sale.id);
        assert_eq!(outstanding[0].balance, Money::from_major(700));
        assert_eq!(outstanding[0].total, Money::from_major(1000));
    }
}
