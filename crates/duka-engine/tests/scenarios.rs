//! End-to-end behaviour of the engine against a real SQLite ledger.

use std::time::Duration;

use chrono::Utc;
use duka_core::{
    Actor, AuditAction, Branch, CoreError, CreditStatus, EntityType, Money, NewSale, NewTransfer,
    PaymentInput, PaymentMethod, Product, ReceivedItem, ReversalDecision, Role, SaleLineInput,
    StockMovementType, TransferLineInput, TransferStatus,
};
use duka_engine::events::TransferStatusChanged;
use duka_engine::{Channel, Engine, EngineConfig, EngineError, EngineEvent, ErrorCode};

const NAIROBI: &str = "nbo-cbd";
const MOMBASA: &str = "msa-road";
const SUGAR: &str = "prod-sugar";
const UNGA: &str = "prod-unga";

// =============================================================================
// Fixtures
// =============================================================================

async fn catalog(engine: &Engine) {
    let catalog = engine.database().catalog();
    let now = Utc::now();
    for (id, name) in [(NAIROBI, "Nairobi CBD"), (MOMBASA, "Mombasa Road")] {
        catalog
            .insert_branch(&Branch {
                id: id.to_string(),
                name: name.to_string(),
                is_active: true,
                created_at: now,
            })
            .await
            .unwrap();
    }
    for (id, name, price, min) in [(SUGAR, "Sugar 1kg", 180, 160), (UNGA, "Unga 2kg", 250, 220)] {
        catalog
            .insert_product(&Product {
                id: id.to_string(),
                sku: id.to_uppercase(),
                name: name.to_string(),
                selling_price_cents: Money::from_major(price).cents(),
                min_price_cents: Money::from_major(min).cents(),
                low_stock_threshold: 5,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }
}

async fn engine() -> Engine {
    let engine = Engine::start(&EngineConfig::in_memory()).await.unwrap();
    catalog(&engine).await;
    engine
}

fn cashier() -> Actor {
    Actor::new("user-cashier", Role::Cashier, Some(NAIROBI.to_string()))
}

fn manager() -> Actor {
    Actor::new("user-manager", Role::Manager, Some(NAIROBI.to_string()))
}

fn line(product_id: &str, quantity: i64, price: i64) -> SaleLineInput {
    SaleLineInput {
        product_id: product_id.to_string(),
        quantity,
        unit_price: Money::from_major(price),
    }
}

fn pay(method: PaymentMethod, amount: i64) -> PaymentInput {
    PaymentInput::new(method, Money::from_major(amount))
}

fn sale(items: Vec<SaleLineInput>, payments: Vec<PaymentInput>) -> NewSale {
    NewSale {
        branch_id: NAIROBI.to_string(),
        items,
        payments,
        customer_name: None,
        customer_phone: None,
        discount: Money::zero(),
    }
}

fn on_credit(mut new_sale: NewSale) -> NewSale {
    new_sale.customer_name = Some("Jane".to_string());
    new_sale.customer_phone = Some("0712345678".to_string());
    new_sale
}

async fn on_hand(engine: &Engine, product_id: &str, branch_id: &str) -> i64 {
    engine
        .inventory_level(product_id, branch_id)
        .await
        .unwrap()
        .map(|r| r.quantity)
        .unwrap_or(0)
}

fn rule(err: &EngineError) -> &CoreError {
    err.as_rule().expect("expected a business rule error")
}

// =============================================================================
// Sale Engine
// =============================================================================

#[tokio::test]
async fn scenario_a_split_cash_and_mpesa() {
    let engine = engine().await;
    engine.restock(UNGA, NAIROBI, 10, &manager()).await.unwrap();

    let detail = engine
        .create_sale(
            &sale(
                vec![line(UNGA, 4, 250)],
                vec![pay(PaymentMethod::Cash, 600), pay(PaymentMethod::Mpesa, 400)],
            ),
            &cashier(),
        )
        .await
        .unwrap();

    assert_eq!(detail.sale.total(), Money::from_major(1000));
    assert!(!detail.sale.is_credit);
    assert_eq!(detail.sale.credit_status, None);
    assert!(detail.balance.is_zero());
    assert!(detail.sale.receipt_number.starts_with("RCP-"));

    // line totals minus discount equal the total, payments equal the total
    let lines: Money = detail.items.iter().map(|i| i.line_total()).sum();
    assert_eq!(lines - detail.sale.discount(), detail.sale.total());
    let paid: Money = detail.payments.iter().map(|p| p.amount()).sum();
    assert!(paid.within(detail.sale.total(), duka_core::PAYMENT_TOLERANCE));

    assert_eq!(on_hand(&engine, UNGA, NAIROBI).await, 6);
}

#[tokio::test]
async fn scenario_b_and_d_credit_then_settlement() {
    let engine = engine().await;
    engine.restock(UNGA, NAIROBI, 10, &manager()).await.unwrap();

    let detail = engine
        .create_sale(
            &on_credit(sale(
                vec![line(UNGA, 4, 250)],
                vec![pay(PaymentMethod::Cash, 300), pay(PaymentMethod::Credit, 700)],
            )),
            &cashier(),
        )
        .await
        .unwrap();
    assert!(detail.sale.is_credit);
    assert_eq!(detail.sale.credit_status, Some(CreditStatus::Partial));
    assert_eq!(detail.balance, Money::from_major(700));
    assert_eq!(
        engine.credit_balance(&detail.sale.id).await.unwrap(),
        Money::from_major(700)
    );

    let outstanding = engine.list_outstanding_credit(NAIROBI).await.unwrap();
    assert_eq!(outstanding.len(), 1);

    let settlement = engine
        .record_credit_payment(&detail.sale.id, Money::from_major(700), PaymentMethod::Cash, &cashier())
        .await
        .unwrap();
    assert!(settlement.balance.is_zero());
    assert_eq!(settlement.sale.credit_status, Some(CreditStatus::Paid));
    assert!(engine.list_outstanding_credit(NAIROBI).await.unwrap().is_empty());
}

#[tokio::test]
async fn scenario_c_insufficient_stock_changes_nothing() {
    let engine = engine().await;
    engine.restock(UNGA, NAIROBI, 3, &manager()).await.unwrap();
    let audit_before = engine.database().audit().count().await.unwrap();

    let err = engine
        .create_sale(
            &sale(vec![line(UNGA, 5, 250)], vec![pay(PaymentMethod::Cash, 1250)]),
            &cashier(),
        )
        .await
        .unwrap_err();

    assert_eq!(
        rule(&err),
        &CoreError::InsufficientStock {
            product: "Unga 2kg".to_string(),
            available: 3,
            requested: 5,
        }
    );
    assert_eq!(err.code(), ErrorCode::InsufficientStock);
    assert_eq!(on_hand(&engine, UNGA, NAIROBI).await, 3);
    assert_eq!(engine.database().audit().count().await.unwrap(), audit_before);
}

#[tokio::test]
async fn rejected_sale_leaves_earlier_lines_untouched() {
    let engine = engine().await;
    engine.restock(SUGAR, NAIROBI, 10, &manager()).await.unwrap();
    engine.restock(UNGA, NAIROBI, 1, &manager()).await.unwrap();
    let audit_before = engine.database().audit().count().await.unwrap();

    // sugar deducts first, unga then fails: the whole sale rolls back
    let err = engine
        .create_sale(
            &sale(
                vec![line(SUGAR, 2, 180), line(UNGA, 2, 250)],
                vec![pay(PaymentMethod::Cash, 860)],
            ),
            &cashier(),
        )
        .await
        .unwrap_err();
    assert!(matches!(rule(&err), CoreError::InsufficientStock { .. }));

    assert_eq!(on_hand(&engine, SUGAR, NAIROBI).await, 10);
    assert_eq!(on_hand(&engine, UNGA, NAIROBI).await, 1);
    assert_eq!(engine.database().audit().count().await.unwrap(), audit_before);
}

#[tokio::test]
async fn business_rules_surface_with_codes() {
    let engine = engine().await;
    engine.restock(SUGAR, NAIROBI, 10, &manager()).await.unwrap();

    let below_floor = engine
        .create_sale(&sale(vec![line(SUGAR, 1, 150)], vec![pay(PaymentMethod::Cash, 150)]), &cashier())
        .await
        .unwrap_err();
    assert_eq!(below_floor.code(), ErrorCode::BelowMinimumPrice);

    let short_paid = engine
        .create_sale(&sale(vec![line(SUGAR, 2, 180)], vec![pay(PaymentMethod::Cash, 300)]), &cashier())
        .await
        .unwrap_err();
    assert_eq!(short_paid.code(), ErrorCode::PaymentError);

    let anonymous_credit = engine
        .create_sale(&sale(vec![line(SUGAR, 1, 180)], vec![pay(PaymentMethod::Credit, 180)]), &cashier())
        .await
        .unwrap_err();
    assert_eq!(rule(&anonymous_credit), &CoreError::MissingCreditCustomerInfo);

    let mut discounted = sale(vec![line(SUGAR, 1, 180)], vec![pay(PaymentMethod::Cash, 0)]);
    discounted.discount = Money::from_major(200);
    let err = engine.create_sale(&discounted, &cashier()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(_) | EngineError::Rule(CoreError::DiscountExceedsSubtotal { .. })
    ));

    assert_eq!(on_hand(&engine, SUGAR, NAIROBI).await, 10);
}

#[tokio::test]
async fn oversized_amounts_rejected_before_any_write() {
    let engine = engine().await;
    engine.restock(UNGA, NAIROBI, 10, &manager()).await.unwrap();

    let wrapping = sale(
        vec![line(UNGA, 1, 250)],
        vec![
            PaymentInput::new(PaymentMethod::Cash, Money::from_cents(i64::MAX)),
            PaymentInput::new(PaymentMethod::Mpesa, Money::from_cents(i64::MAX)),
            PaymentInput::new(PaymentMethod::Cash, Money::from_cents(25_002)),
        ],
    );
    let err = engine.create_sale(&wrapping, &cashier()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let mut huge_price = sale(vec![line(UNGA, 2, 250)], vec![pay(PaymentMethod::Cash, 500)]);
    huge_price.items[0].unit_price = Money::from_cents(i64::MAX / 2 + 1);
    let err = engine.create_sale(&huge_price, &cashier()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    assert_eq!(on_hand(&engine, UNGA, NAIROBI).await, 10);
    assert!(engine.database().sales().list_branch(NAIROBI, 10).await.unwrap().is_empty());
}

// =============================================================================
// Credit Ledger
// =============================================================================

#[tokio::test]
async fn credit_balance_only_goes_down() {
    let engine = engine().await;
    engine.restock(UNGA, NAIROBI, 10, &manager()).await.unwrap();
    let detail = engine
        .create_sale(
            &on_credit(sale(vec![line(UNGA, 4, 250)], vec![pay(PaymentMethod::Credit, 1000)])),
            &cashier(),
        )
        .await
        .unwrap();
    assert_eq!(detail.sale.credit_status, Some(CreditStatus::Pending));

    let mut last = detail.balance;
    for (amount, expected) in [
        (Money::from_major(300), CreditStatus::Partial),
        (Money::from_major(500), CreditStatus::Partial),
        // leaves 0.50 owing: below 1.00 counts as settled
        (Money::from_cents(19_950), CreditStatus::Paid),
    ] {
        let settlement = engine
            .record_credit_payment(&detail.sale.id, amount, PaymentMethod::Mpesa, &cashier())
            .await
            .unwrap();
        assert!(settlement.balance < last);
        assert_eq!(settlement.sale.credit_status, Some(expected));
        last = settlement.balance;
    }
    assert_eq!(last, Money::from_cents(50));

    let err = engine
        .record_credit_payment(&detail.sale.id, Money::from_cents(50), PaymentMethod::Cash, &cashier())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);
}

#[tokio::test]
async fn overpayment_rejected() {
    let engine = engine().await;
    engine.restock(SUGAR, NAIROBI, 5, &manager()).await.unwrap();
    let detail = engine
        .create_sale(
            &on_credit(sale(vec![line(SUGAR, 1, 180)], vec![pay(PaymentMethod::Credit, 180)])),
            &cashier(),
        )
        .await
        .unwrap();

    let err = engine
        .record_credit_payment(&detail.sale.id, Money::from_major(200), PaymentMethod::Cash, &cashier())
        .await
        .unwrap_err();
    assert!(matches!(rule(&err), CoreError::Overpayment { .. }));
    assert_eq!(
        engine.credit_balance(&detail.sale.id).await.unwrap(),
        Money::from_major(180)
    );
}

// =============================================================================
// Reversal Workflow
// =============================================================================

#[tokio::test]
async fn approved_reversal_restores_pre_sale_stock() {
    let engine = engine().await;
    engine.restock(SUGAR, NAIROBI, 10, &manager()).await.unwrap();
    engine.restock(UNGA, NAIROBI, 8, &manager()).await.unwrap();

    let detail = engine
        .create_sale(
            &sale(
                vec![line(SUGAR, 3, 180), line(UNGA, 2, 250)],
                vec![pay(PaymentMethod::Cash, 1040)],
            ),
            &cashier(),
        )
        .await
        .unwrap();
    assert_eq!(on_hand(&engine, SUGAR, NAIROBI).await, 7);

    engine
        .request_reversal(&detail.sale.id, "customer returned goods", &cashier())
        .await
        .unwrap();
    let outcome = engine
        .decide_reversal(&detail.sale.id, ReversalDecision::Approved, Some("verified"), &manager())
        .await
        .unwrap();
    assert!(outcome.sale.is_reversed);

    assert_eq!(on_hand(&engine, SUGAR, NAIROBI).await, 10);
    assert_eq!(on_hand(&engine, UNGA, NAIROBI).await, 8);

    // one-way: a second decision is refused and restores nothing
    let err = engine
        .decide_reversal(&detail.sale.id, ReversalDecision::Approved, None, &manager())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);
    assert_eq!(on_hand(&engine, SUGAR, NAIROBI).await, 10);

    let actions: Vec<_> = engine
        .audit_trail(EntityType::Sale, &detail.sale.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::SaleCreated,
            AuditAction::ReversalRequested,
            AuditAction::ReversalApproved,
        ]
    );
}

// =============================================================================
// Transfer Workflow
// =============================================================================

fn transfer_of(product_id: &str, quantity: i64) -> NewTransfer {
    NewTransfer {
        from_branch_id: NAIROBI.to_string(),
        to_branch_id: MOMBASA.to_string(),
        items: vec![TransferLineInput {
            product_id: product_id.to_string(),
            quantity,
        }],
        notes: None,
    }
}

#[tokio::test]
async fn scenario_e_short_delivery() {
    let engine = engine().await;
    engine.restock(SUGAR, NAIROBI, 20, &manager()).await.unwrap();

    let requested = engine.request_transfer(&transfer_of(SUGAR, 10), &manager()).await.unwrap();
    let id = requested.transfer.id.clone();

    let approved = engine
        .approve_transfer(
            &id,
            &[TransferLineInput {
                product_id: SUGAR.to_string(),
                quantity: 8,
            }],
            &manager(),
        )
        .await
        .unwrap();
    assert_eq!(approved.transfer.status, TransferStatus::Approved);

    engine.pack_transfer(&id, &manager()).await.unwrap();
    engine.dispatch_transfer(&id, None, &manager()).await.unwrap();
    assert_eq!(on_hand(&engine, SUGAR, NAIROBI).await, 12);

    let seven = [ReceivedItem {
        product_id: SUGAR.to_string(),
        quantity: 7,
        discrepancy_reason: Some("one bag torn".to_string()),
    }];
    let err = engine.receive_transfer(&id, &seven, None, &manager()).await.unwrap_err();
    assert_eq!(rule(&err), &CoreError::MissingDiscrepancyNotes);

    let received = engine
        .receive_transfer(&id, &seven, Some("short by one"), &manager())
        .await
        .unwrap();
    assert_eq!(received.transfer.status, TransferStatus::ReceivedWithDiscrepancy);
    assert_eq!(on_hand(&engine, SUGAR, MOMBASA).await, 7);
    assert_eq!(on_hand(&engine, SUGAR, NAIROBI).await, 12);
}

#[tokio::test]
async fn transfer_status_only_moves_forward() {
    let engine = engine().await;
    engine.restock(SUGAR, NAIROBI, 20, &manager()).await.unwrap();
    let requested = engine.request_transfer(&transfer_of(SUGAR, 5), &manager()).await.unwrap();

    let err = engine
        .dispatch_transfer(&requested.transfer.id, None, &manager())
        .await
        .unwrap_err();
    assert!(matches!(rule(&err), CoreError::InvalidStateTransition { .. }));
    assert_eq!(on_hand(&engine, SUGAR, NAIROBI).await, 20);

    engine
        .cancel_transfer(&requested.transfer.id, "not needed", &manager())
        .await
        .unwrap();
    let err = engine
        .approve_transfer(
            &requested.transfer.id,
            &[TransferLineInput {
                product_id: SUGAR.to_string(),
                quantity: 5,
            }],
            &manager(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);

    let cancelled = engine
        .list_transfers(NAIROBI, Some(TransferStatus::Cancelled))
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
}

#[tokio::test]
async fn scenario_f_restock_closes_pending_request() {
    let engine = engine().await;
    let mut overseer = engine.subscribe(Channel::Global);

    let requested = engine.request_transfer(&transfer_of(SUGAR, 10), &manager()).await.unwrap();
    let outcome = engine.restock(SUGAR, NAIROBI, 20, &manager()).await.unwrap();
    assert_eq!(outcome.auto_completed.len(), 1);

    let transfer = engine.get_transfer(&requested.transfer.id).await.unwrap().transfer;
    assert_eq!(transfer.status, TransferStatus::Received);
    assert!(transfer.auto_completed);
    assert!(transfer.received_at.is_some());
    // the restock is the only stock change
    assert_eq!(on_hand(&engine, SUGAR, NAIROBI).await, 20);
    assert_eq!(on_hand(&engine, SUGAR, MOMBASA).await, 0);

    let trail = engine
        .audit_trail(EntityType::Transfer, &transfer.id)
        .await
        .unwrap();
    assert!(trail.iter().any(|e| e.action == AuditAction::TransferAutoCompleted));

    // request, restock, auto-completion
    let mut topics = Vec::new();
    for _ in 0..3 {
        topics.push(overseer.recv().await.unwrap());
    }
    assert!(matches!(
        &topics[2],
        EngineEvent::TransferStatusChanged(TransferStatusChanged {
            previous: Some(TransferStatus::Requested),
            status: TransferStatus::Received,
            auto_completed: true,
            ..
        })
    ));
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test]
async fn events_follow_commits_only() {
    let engine = engine().await;
    let mut nairobi = engine.subscribe(Channel::Branch(NAIROBI.to_string()));
    let mut mombasa = engine.subscribe(Channel::Branch(MOMBASA.to_string()));

    engine.restock(SUGAR, NAIROBI, 6, &manager()).await.unwrap();
    match nairobi.recv().await.unwrap() {
        EngineEvent::InventoryUpdated(e) => assert_eq!(e.reason, StockMovementType::Restock),
        other => panic!("expected inventory.updated, got {}", other.topic()),
    }

    // rejected: no event may be queued for it
    engine
        .create_sale(&sale(vec![line(SUGAR, 9, 180)], vec![pay(PaymentMethod::Cash, 1620)]), &cashier())
        .await
        .unwrap_err();

    let detail = engine
        .create_sale(&sale(vec![line(SUGAR, 2, 180)], vec![pay(PaymentMethod::Cash, 360)]), &cashier())
        .await
        .unwrap();

    match nairobi.recv().await.unwrap() {
        EngineEvent::SaleCreated(e) => assert_eq!(e.sale_id, detail.sale.id),
        other => panic!("expected sale.created, got {}", other.topic()),
    }
    match nairobi.recv().await.unwrap() {
        EngineEvent::InventoryUpdated(e) => {
            assert_eq!(e.quantity, 4);
            assert_eq!(e.delta, -2);
            assert_eq!(e.reason, StockMovementType::Sale);
        }
        other => panic!("expected inventory.updated, got {}", other.topic()),
    }
    // 4 left, threshold 5
    match nairobi.recv().await.unwrap() {
        EngineEvent::LowStockAlert(item) => assert_eq!(item.quantity, 4),
        other => panic!("expected lowStock.alert, got {}", other.topic()),
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(mombasa.try_recv().is_none());

    engine.shutdown().await;
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sales_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.database.path = dir.path().join("ledger.db");
    config.database.max_connections = 8;
    config.engine.max_conflict_retries = 10;
    config.engine.retry_backoff_ms = 1;

    let engine = Engine::start(&config).await.unwrap();
    catalog(&engine).await;
    engine.restock(SUGAR, NAIROBI, 10, &manager()).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .create_sale(&sale(vec![line(SUGAR, 2, 180)], vec![pay(PaymentMethod::Cash, 360)]), &cashier())
                .await
        }));
    }

    let mut sold = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => sold += 2,
            Err(err) => assert!(
                matches!(err.code(), ErrorCode::InsufficientStock | ErrorCode::Conflict),
                "unexpected error: {err}"
            ),
        }
    }

    assert!(sold > 0);
    assert!(sold <= 10);
    assert_eq!(on_hand(&engine, SUGAR, NAIROBI).await, 10 - sold);

    let sales = engine.database().sales().list_branch(NAIROBI, 50).await.unwrap();
    assert_eq!(sales.len() as i64 * 2, sold);
}
