//! # Engine
//!
//! The transactional API the HTTP layer calls.
//!
//! ## Anatomy of a Mutation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Engine::create_sale(&sale, &actor)                  │
//! │                                                                         │
//! │  1. validate_new_sale ──────────────── ValidationError → caller         │
//! │                                                                         │
//! │  2. RetryPolicy::run ─┐                                                 │
//! │                       ▼                                                 │
//! │     SaleRepository::create_sale (one tx: stock, sale, payments, audit)  │
//! │                       │                                                 │
//! │       StaleVersion ◄──┤──► CoreError → rolled back → caller             │
//! │       (fresh reads,   │                                                 │
//! │        up to N tries) ▼                                                 │
//! │                    COMMIT                                               │
//! │                                                                         │
//! │  3. EventQueue::publish (sale.created, inventory.updated,               │
//! │     lowStock.alert). Never blocks, never fails the sale.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads go straight to the repositories.

use tracing::{debug, info, warn};

use duka_core::validation::{validate_new_sale, validate_payment_amount};
use duka_core::{
    Actor, AuditEntry, EntityType, InventoryRecord, LowStockItem, Money, NewSale, NewTransfer,
    PaymentMethod, ReceivedItem, ReversalDecision, Sale, SaleDetail, StockMovementType, Transfer,
    TransferDetail, TransferLineInput, TransferStatus,
};
use duka_db::repository::inventory::threshold_for;
use duka_db::{
    CreditSettlement, Database, OutstandingCredit, RestockOutcome, ReversalOutcome, StockChange,
    TransferOutcome,
};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::events::{
    Channel, CreditPaymentRecorded, EngineEvent, InventoryUpdated, ReversalDecided,
    ReversalRequested, SaleCreated, TransferStatusChanged,
};
use crate::notifier::{pipeline, DispatcherHandle, EventQueue, Subscription};
use crate::retry::RetryPolicy;

/// Transactional engine over one ledger store.
///
/// Cheap to clone; clones share the pool and the event queue.
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    retry: RetryPolicy,
    events: EventQueue,
    notifier: DispatcherHandle,
}

impl Engine {
    /// Opens the ledger store and starts the notification dispatcher.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn start(config: &EngineConfig) -> EngineResult<Self> {
        let db = Database::new(config.db_config()).await?;
        Ok(Self::with_database(db, config))
    }

    /// Wraps an open database; spawns the dispatcher task.
    pub fn with_database(db: Database, config: &EngineConfig) -> Self {
        let (events, dispatcher, notifier) = pipeline(
            config.notifications.queue_capacity,
            config.notifications.broadcast_capacity,
        );
        tokio::spawn(dispatcher.run());

        let retry = RetryPolicy::new(config.engine.max_conflict_retries, config.retry_backoff());
        info!(
            max_attempts = retry.max_attempts,
            backoff_ms = config.engine.retry_backoff_ms,
            "Engine started"
        );

        Engine {
            db,
            retry,
            events,
            notifier,
        }
    }

    /// The underlying store, for catalog maintenance and seeding.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Subscribes to post-commit events for `channel`.
    pub fn subscribe(&self, channel: Channel) -> Subscription {
        self.notifier.subscribe(channel)
    }

    /// Stops the dispatcher after flushing queued events.
    pub async fn shutdown(&self) {
        self.notifier.shutdown().await;
    }

    // =========================================================================
    // Sale Engine
    // =========================================================================

    /// Commits a sale: price floors, stock deduction, payment reconciliation
    /// and credit classification, all or nothing.
    pub async fn create_sale(&self, new_sale: &NewSale, actor: &Actor) -> EngineResult<SaleDetail> {
        validate_new_sale(new_sale)?;

        let sales = self.db.sales();
        let receipt = self
            .retry
            .run("create_sale", || sales.create_sale(new_sale, actor))
            .await?;

        let sale = &receipt.detail.sale;
        let mut events = vec![EngineEvent::SaleCreated(SaleCreated::from(sale))];
        events.extend(stock_events(&receipt.stock, StockMovementType::Sale, Some(&sale.id)));
        events.extend(receipt.low_stock.iter().cloned().map(EngineEvent::LowStockAlert));
        self.events.publish_all(events);

        Ok(receipt.detail)
    }

    // =========================================================================
    // Credit Ledger
    // =========================================================================

    /// Records a settlement against a credit sale.
    pub async fn record_credit_payment(
        &self,
        sale_id: &str,
        amount: Money,
        method: PaymentMethod,
        actor: &Actor,
    ) -> EngineResult<CreditSettlement> {
        validate_payment_amount(amount)?;

        let credit = self.db.credit();
        let settlement = self
            .retry
            .run("record_credit_payment", || {
                credit.record_payment(sale_id, amount, method, actor)
            })
            .await?;

        self.events
            .publish(EngineEvent::CreditPaymentRecorded(CreditPaymentRecorded {
                sale_id: settlement.sale.id.clone(),
                receipt_number: settlement.sale.receipt_number.clone(),
                branch_id: settlement.sale.branch_id.clone(),
                amount,
                balance: settlement.balance,
                credit_status: settlement.sale.credit_status,
            }));

        Ok(settlement)
    }

    // =========================================================================
    // Reversal Workflow
    // =========================================================================

    /// Opens a reversal request; no stock moves yet.
    pub async fn request_reversal(&self, sale_id: &str, reason: &str, actor: &Actor) -> EngineResult<Sale> {
        let reversals = self.db.reversals();
        let sale = self
            .retry
            .run("request_reversal", || reversals.request(sale_id, reason, actor))
            .await?;

        self.events
            .publish(EngineEvent::ReversalRequested(ReversalRequested {
                sale_id: sale.id.clone(),
                receipt_number: sale.receipt_number.clone(),
                branch_id: sale.branch_id.clone(),
                reason: reason.trim().to_string(),
                requested_by: actor.user_id.clone(),
            }));

        Ok(sale)
    }

    /// Approves (restoring stock) or rejects a pending reversal.
    pub async fn decide_reversal(
        &self,
        sale_id: &str,
        decision: ReversalDecision,
        admin_notes: Option<&str>,
        actor: &Actor,
    ) -> EngineResult<ReversalOutcome> {
        let reversals = self.db.reversals();
        let outcome = self
            .retry
            .run("decide_reversal", || {
                reversals.decide(sale_id, decision, admin_notes, actor)
            })
            .await?;

        let sale = &outcome.sale;
        let mut events = vec![EngineEvent::ReversalDecision(ReversalDecided {
            sale_id: sale.id.clone(),
            receipt_number: sale.receipt_number.clone(),
            branch_id: sale.branch_id.clone(),
            decision,
            decided_by: actor.user_id.clone(),
            admin_notes: sale.admin_notes.clone(),
        })];
        events.extend(stock_events(&outcome.restored, StockMovementType::Return, Some(&sale.id)));
        self.events.publish_all(events);

        Ok(outcome)
    }

    // =========================================================================
    // Inventory Guard
    // =========================================================================

    /// Manual restock, including closed-loop completion of pending transfers
    /// out of the restocked branch.
    pub async fn restock(
        &self,
        product_id: &str,
        branch_id: &str,
        quantity: i64,
        actor: &Actor,
    ) -> EngineResult<RestockOutcome> {
        let inventory = self.db.inventory();
        let outcome = self
            .retry
            .run("restock", || inventory.restock(product_id, branch_id, quantity, actor))
            .await?;

        let mut events = stock_events(
            std::slice::from_ref(&outcome.change),
            StockMovementType::Restock,
            None,
        );
        events.extend(outcome.auto_completed.iter().map(|done| {
            EngineEvent::TransferStatusChanged(TransferStatusChanged::new(
                &done.transfer,
                Some(done.previous),
            ))
        }));
        self.events.publish_all(events);

        Ok(outcome)
    }

    /// Sets the branch selling price and/or low-stock threshold of a product.
    pub async fn set_branch_overrides(
        &self,
        product_id: &str,
        branch_id: &str,
        selling_price: Option<Money>,
        low_stock_threshold: Option<i64>,
    ) -> EngineResult<InventoryRecord> {
        let inventory = self.db.inventory();
        self.retry
            .run("set_branch_overrides", || {
                inventory.set_branch_overrides(product_id, branch_id, selling_price, low_stock_threshold)
            })
            .await
    }

    // =========================================================================
    // Transfer Workflow
    // =========================================================================

    /// Opens a transfer request (REQUESTED).
    pub async fn request_transfer(&self, new_transfer: &NewTransfer, actor: &Actor) -> EngineResult<TransferDetail> {
        let transfers = self.db.transfers();
        let outcome = self
            .retry
            .run("request_transfer", || transfers.request(new_transfer, actor))
            .await?;
        Ok(self.announce_transfer(outcome, None).await)
    }

    /// REQUESTED → APPROVED, with per-item approved quantities.
    pub async fn approve_transfer(
        &self,
        transfer_id: &str,
        approved: &[TransferLineInput],
        actor: &Actor,
    ) -> EngineResult<TransferDetail> {
        let transfers = self.db.transfers();
        let outcome = self
            .retry
            .run("approve_transfer", || transfers.approve(transfer_id, approved, actor))
            .await?;
        Ok(self.announce_transfer(outcome, None).await)
    }

    /// APPROVED → PACKED.
    pub async fn pack_transfer(&self, transfer_id: &str, actor: &Actor) -> EngineResult<TransferDetail> {
        let transfers = self.db.transfers();
        let outcome = self
            .retry
            .run("pack_transfer", || transfers.pack(transfer_id, actor))
            .await?;
        Ok(self.announce_transfer(outcome, None).await)
    }

    /// PACKED → DISPATCHED, deducting approved quantities at the source.
    pub async fn dispatch_transfer(
        &self,
        transfer_id: &str,
        parcel_tracking: Option<&str>,
        actor: &Actor,
    ) -> EngineResult<TransferDetail> {
        let transfers = self.db.transfers();
        let outcome = self
            .retry
            .run("dispatch_transfer", || {
                transfers.dispatch(transfer_id, parcel_tracking, actor)
            })
            .await?;
        Ok(self
            .announce_transfer(outcome, Some(StockMovementType::TransferOut))
            .await)
    }

    /// DISPATCHED → RECEIVED or RECEIVED_WITH_DISCREPANCY, crediting the
    /// destination with what arrived.
    pub async fn receive_transfer(
        &self,
        transfer_id: &str,
        received: &[ReceivedItem],
        discrepancy_notes: Option<&str>,
        actor: &Actor,
    ) -> EngineResult<TransferDetail> {
        let transfers = self.db.transfers();
        let outcome = self
            .retry
            .run("receive_transfer", || {
                transfers.receive(transfer_id, received, discrepancy_notes, actor)
            })
            .await?;
        Ok(self
            .announce_transfer(outcome, Some(StockMovementType::TransferIn))
            .await)
    }

    /// Cancels a non-terminal transfer; dispatched stock goes back to the
    /// source.
    pub async fn cancel_transfer(&self, transfer_id: &str, reason: &str, actor: &Actor) -> EngineResult<TransferDetail> {
        let transfers = self.db.transfers();
        let outcome = self
            .retry
            .run("cancel_transfer", || transfers.cancel(transfer_id, reason, actor))
            .await?;
        Ok(self
            .announce_transfer(outcome, Some(StockMovementType::TransferReturn))
            .await)
    }

    /// Publishes the status change and any stock movement of a committed
    /// transfer step.
    async fn announce_transfer(
        &self,
        outcome: TransferOutcome,
        movement: Option<StockMovementType>,
    ) -> TransferDetail {
        let transfer = &outcome.detail.transfer;
        let mut events = vec![EngineEvent::TransferStatusChanged(TransferStatusChanged::new(
            transfer,
            outcome.previous,
        ))];

        if let Some(movement) = movement {
            events.extend(stock_events(&outcome.stock, movement, Some(&transfer.id)));
            if movement == StockMovementType::TransferOut {
                events.extend(
                    self.low_stock_after(&outcome.stock)
                        .await
                        .into_iter()
                        .map(EngineEvent::LowStockAlert),
                );
            }
        }

        self.events.publish_all(events);
        outcome.detail
    }

    /// Rows that a committed deduction left at or below threshold.
    ///
    /// Runs after commit; a failed lookup skips the alert.
    async fn low_stock_after(&self, stock: &[StockChange]) -> Vec<LowStockItem> {
        let catalog = self.db.catalog();
        let mut low = Vec::new();
        for change in stock {
            let product = match catalog.get_product(&change.product_id).await {
                Ok(Some(product)) => product,
                Ok(None) => continue,
                Err(e) => {
                    warn!(product_id = %change.product_id, error = %e, "Skipping low-stock check");
                    continue;
                }
            };
            let threshold = threshold_for(change, product.low_stock_threshold);
            if duka_core::inventory::low_stock_check(change.after.quantity, threshold) {
                low.push(LowStockItem {
                    product_id: product.id,
                    product_name: product.name,
                    branch_id: change.branch_id.clone(),
                    quantity: change.after.quantity,
                    threshold,
                });
            }
        }
        low
    }

    // =========================================================================
    // Read Models
    // =========================================================================

    /// Sale with items, payments, settlements and outstanding balance.
    pub async fn get_sale(&self, sale_id: &str) -> EngineResult<SaleDetail> {
        debug!(sale_id, "Loading sale");
        Ok(self.db.sales().get_detail(sale_id).await?)
    }

    /// Outstanding debt on a sale; zero for non-credit sales.
    pub async fn credit_balance(&self, sale_id: &str) -> EngineResult<Money> {
        Ok(self.db.credit().balance(sale_id).await?)
    }

    /// Credit sales of a branch that still carry debt.
    pub async fn list_outstanding_credit(&self, branch_id: &str) -> EngineResult<Vec<OutstandingCredit>> {
        Ok(self.db.credit().list_outstanding(branch_id).await?)
    }

    /// Transfer with its items.
    pub async fn get_transfer(&self, transfer_id: &str) -> EngineResult<TransferDetail> {
        Ok(self.db.transfers().get(transfer_id).await?)
    }

    /// Transfers into or out of a branch, optionally in one status.
    pub async fn list_transfers(
        &self,
        branch_id: &str,
        status: Option<TransferStatus>,
    ) -> EngineResult<Vec<Transfer>> {
        Ok(self.db.transfers().list(branch_id, status).await?)
    }

    /// Inventory row of a product at a branch; `None` means nothing stocked.
    pub async fn inventory_level(&self, product_id: &str, branch_id: &str) -> EngineResult<Option<InventoryRecord>> {
        Ok(self.db.inventory().get(product_id, branch_id).await?)
    }

    /// Products at or below threshold at a branch.
    pub async fn list_low_stock(&self, branch_id: &str) -> EngineResult<Vec<LowStockItem>> {
        Ok(self.db.inventory().list_low_stock(branch_id).await?)
    }

    /// Audit entries of one entity, oldest first.
    pub async fn audit_trail(&self, entity_type: EntityType, entity_id: &str) -> EngineResult<Vec<AuditEntry>> {
        Ok(self.db.audit().trail(entity_type, entity_id).await?)
    }
}

fn stock_events(
    changes: &[StockChange],
    reason: StockMovementType,
    reference_id: Option<&str>,
) -> Vec<EngineEvent> {
    changes
        .iter()
        .map(|change| EngineEvent::InventoryUpdated(InventoryUpdated::from_change(change, reason, reference_id)))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
