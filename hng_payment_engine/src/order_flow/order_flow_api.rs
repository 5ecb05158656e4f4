use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{
        ChargeStatus,
        GatewayId,
        LedgerStatus,
        NewOrder,
        NewTransaction,
        Order,
        OrderId,
        OrderItem,
        OrderNote,
        OrderStatus,
        PaymentEvent,
        PaymentEventKind,
        Transaction,
        TransactionKind,
    },
    events::{EventProducers, OrderAnnulledEvent, OrderCreatedEvent, PaymentConfirmedEvent, StatusChangedEvent},
    fees::FeeCalculator,
    order_flow::{CheckoutOutcome, CheckoutRequest, OrderFlowError, SettlementOutcome},
    traits::{Ledger, OrderQueryFilter, SettlementDatabase},
};

/// `OrderFlowApi` is the primary API for the order lifecycle: creating orders from carts, moving them through the
/// status state machine, and applying normalized payment events from either the webhook pipeline or the charge
/// poller.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: SettlementDatabase
{
    /// Create an order from a cart.
    ///
    /// Validates the billing snapshot, computes the totals from the cart lines, assigns the next sequential order
    /// number and persists the order with every item in a single atomic transaction. Nothing is written if any part
    /// fails. Stock decrement, sales counters and cart clearing are listener concerns, driven by the
    /// `OrderCreated` event this publishes.
    pub async fn create_from_cart(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, OrderFlowError> {
        let missing = request.billing.missing_fields();
        if !missing.is_empty() {
            return Err(OrderFlowError::MissingBillingFields(missing.join(", ")));
        }
        if request.items.is_empty() {
            return Err(OrderFlowError::EmptyCart);
        }
        let mut order = NewOrder::new(request.customer_id.clone(), request.subtotal(), request.payment_method);
        order.product_type = request.product_type;
        order.shipping_total = request.shipping_total;
        order.discount_total = request.discount_total;
        order.commission = request.commission();
        order.billing = request.billing.clone();
        order.client_ip = request.client_ip.clone();
        order.user_agent = request.user_agent.clone();
        let (order, items) = self.db.insert_order(order, request.items).await?;
        info!("🛒️ Order [{}] created: {} for {} item(s)", order.order_number, order.total, items.len());
        self.call_order_created_hook(&order, items.len()).await;
        Ok(CheckoutOutcome { order, items })
    }

    /// Move an order to a new status.
    ///
    /// A move into the current status returns [`OrderFlowError::TransitionNoOp`]; a move the state machine forbids
    /// returns [`OrderFlowError::InvalidTransition`]. Every applied transition writes an order note (auto-generated
    /// when `note` is `None`) and publishes a `StatusChanged` event; moves into `cancelled`, `failed` or `refunded`
    /// also publish `OrderAnnulled`.
    pub async fn transition_order(
        &self,
        order_id: i64,
        new_status: OrderStatus,
        note: Option<String>,
    ) -> Result<Order, OrderFlowError> {
        let order = self
            .db
            .fetch_order_by_id(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(format!("id {order_id}")))?;
        if order.status == new_status {
            return Err(OrderFlowError::TransitionNoOp(new_status));
        }
        if !order.status.can_transition_to(new_status) {
            return Err(OrderFlowError::InvalidTransition {
                order: order.order_number.to_string(),
                from: order.status,
                to: new_status,
            });
        }
        let old_status = order.status;
        let updated = self.db.update_order_status(order_id, new_status).await?;
        let note = note.unwrap_or_else(|| format!("Status changed from {old_status} to {new_status}."));
        self.db.add_order_note(order_id, &note).await?;
        debug!("🛒️ Order [{}] moved from {old_status} to {new_status}", updated.order_number);
        self.call_status_changed_hook(&updated, old_status).await;
        if matches!(new_status, OrderStatus::Cancelled | OrderStatus::Failed | OrderStatus::Refunded) {
            self.call_order_annulled_hook(&updated).await;
        }
        Ok(updated)
    }

    async fn call_order_created_hook(&self, order: &Order, item_count: usize) {
        for emitter in &self.producers.order_created_producer {
            emitter.publish_event(OrderCreatedEvent::new(order.clone(), item_count)).await;
        }
    }

    async fn call_status_changed_hook(&self, order: &Order, old_status: OrderStatus) {
        for emitter in &self.producers.status_changed_producer {
            emitter.publish_event(StatusChangedEvent::new(order.clone(), old_status)).await;
        }
    }

    async fn call_order_annulled_hook(&self, order: &Order) {
        for emitter in &self.producers.order_annulled_producer {
            emitter.publish_event(OrderAnnulledEvent::new(order.clone())).await;
        }
    }

    async fn call_payment_confirmed_hook(&self, order: &Order, transaction: &Transaction) {
        for emitter in &self.producers.payment_confirmed_producer {
            emitter.publish_event(PaymentConfirmedEvent::new(order.clone(), transaction.clone())).await;
        }
    }

    //----------------------------------         Queries         -----------------------------------------------------

    pub async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, OrderFlowError> {
        Ok(self.db.fetch_order_by_id(order_id).await?)
    }

    pub async fn fetch_order_by_number(&self, number: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        Ok(self.db.fetch_order_by_number(number).await?)
    }

    pub async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderFlowError> {
        Ok(self.db.fetch_order_items(order_id).await?)
    }

    pub async fn fetch_order_notes(&self, order_id: i64) -> Result<Vec<OrderNote>, OrderFlowError> {
        Ok(self.db.fetch_order_notes(order_id).await?)
    }

    pub async fn fetch_transactions(&self, order_id: i64) -> Result<Vec<Transaction>, OrderFlowError> {
        Ok(self.db.fetch_transactions_for_order(order_id).await?)
    }

    pub async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        Ok(self.db.search_orders(filter).await?)
    }

    /// Durably mark a webhook event id as accepted. Of two concurrent calls for the same id, exactly one gets
    /// `true`.
    pub async fn try_mark_event(&self, gateway: GatewayId, event_id: &str) -> Result<bool, OrderFlowError> {
        Ok(self.db.try_mark_event(gateway, event_id).await?)
    }

    /// Delete event markers older than the retention window. Returns the number pruned.
    pub async fn prune_event_markers(&self, older_than: chrono::Duration) -> Result<u64, OrderFlowError> {
        Ok(self.db.prune_event_markers(older_than).await?)
    }

    /// Attach the gateway and its payment id to the order, once payment creation succeeds.
    pub async fn set_payment_reference(
        &self,
        order_id: i64,
        gateway: GatewayId,
        transaction_id: &str,
    ) -> Result<Order, OrderFlowError> {
        Ok(self.db.set_payment_reference(order_id, gateway, transaction_id).await?)
    }
}

impl<B> OrderFlowApi<B>
where B: SettlementDatabase + Ledger
{
    /// The single transition function both event producers (webhook ingestion and charge polling) funnel through.
    ///
    /// Applying the same event twice is a no-op: the order status check and the transaction uniqueness check both
    /// guard it, so delivery order and duplication between the two producers don't matter. `calculator` supplies the
    /// fee breakdown for the transaction record; `is_fallback` says whether those numbers were validated by the
    /// orchestrator or computed locally.
    pub async fn apply_payment_event(
        &self,
        event: PaymentEvent,
        calculator: &FeeCalculator,
        is_fallback: bool,
    ) -> Result<SettlementOutcome, OrderFlowError> {
        let Some(order) = self.locate_order(&event).await? else {
            let hint = event.payment_id.clone().or_else(|| event.order_ref.as_ref().map(|o| o.to_string()));
            return Err(OrderFlowError::OrderNotFound(hint.unwrap_or_else(|| "no order reference in event".into())));
        };
        let external_id = event
            .payment_id
            .clone()
            .or_else(|| event.event_id.clone())
            .unwrap_or_else(|| format!("order-{}", order.id));
        match event.kind {
            PaymentEventKind::Paid => self.apply_paid(order, &event, &external_id, calculator, is_fallback).await,
            PaymentEventKind::Overdue => self.apply_overdue(order, &event).await,
            PaymentEventKind::Refunded => {
                self.apply_refunded(order, &event, &external_id, calculator, is_fallback).await
            },
            PaymentEventKind::Created => {
                trace!("🛒️ Charge-created event for order [{}]; nothing to apply", order.order_number);
                Ok(SettlementOutcome::Ignored)
            },
        }
    }

    async fn locate_order(&self, event: &PaymentEvent) -> Result<Option<Order>, OrderFlowError> {
        if let Some(pid) = &event.payment_id {
            if let Some(order) = self.db.fetch_order_by_payment_id(event.gateway, pid).await? {
                return Ok(Some(order));
            }
        }
        if let Some(order_ref) = &event.order_ref {
            return Ok(self.db.fetch_order_by_number(order_ref).await?);
        }
        Ok(None)
    }

    async fn apply_paid(
        &self,
        order: Order,
        event: &PaymentEvent,
        external_id: &str,
        calculator: &FeeCalculator,
        is_fallback: bool,
    ) -> Result<SettlementOutcome, OrderFlowError> {
        if order.status.is_paid() {
            debug!("🛒️ Order [{}] is already {}; payment event ignored", order.order_number, order.status);
            return Ok(SettlementOutcome::AlreadyApplied(order));
        }
        if self.db.transaction_exists(event.gateway, external_id, TransactionKind::Settlement).await? {
            debug!("🛒️ Settlement [{external_id}] already recorded for order [{}]", order.order_number);
            return Ok(SettlementOutcome::AlreadyApplied(order));
        }
        let gross = event.amount.unwrap_or(order.total);
        let gmv = self.db.gmv_for_current_month().await?;
        let breakdown = calculator.all_fees(gross, order.product_type, gmv, event.gateway, order.payment_method);
        // The provider's own fee figure, when it sends one, beats the table.
        let gateway_fee = event.gateway_fee.unwrap_or(breakdown.gateway_fee);
        let tx = NewTransaction {
            order_id: order.id,
            gateway: event.gateway,
            external_id: external_id.to_string(),
            kind: TransactionKind::Settlement,
            gross_amount: gross,
            gateway_fee,
            platform_fee: breakdown.plugin_fee,
            net_amount: gross - breakdown.plugin_fee - gateway_fee,
            tier_used: breakdown.tier_used,
            is_fallback,
            raw_payload: event.raw.to_string(),
        };
        let transaction = self.db.insert_transaction(tx).await?;
        let note = format!("Payment of {gross} confirmed by {} [{external_id}].", event.gateway);
        let order = match self.transition_order(order.id, OrderStatus::Processing, Some(note)).await {
            Ok(order) => order,
            Err(OrderFlowError::TransitionNoOp(_)) => order,
            Err(e) => return Err(e),
        };
        self.settle_charge(&order, event, ChargeStatus::Paid, LedgerStatus::Settled).await?;
        info!("💰️ Order [{}] settled: {gross} via {}", order.order_number, event.gateway);
        self.call_payment_confirmed_hook(&order, &transaction).await;
        Ok(SettlementOutcome::Applied { order, transaction: Some(transaction) })
    }

    async fn apply_overdue(&self, order: Order, event: &PaymentEvent) -> Result<SettlementOutcome, OrderFlowError> {
        let note = format!("Payment overdue according to {}.", event.gateway);
        let order = match self.transition_order(order.id, OrderStatus::OnHold, Some(note)).await {
            Ok(order) => order,
            Err(OrderFlowError::TransitionNoOp(_)) => return Ok(SettlementOutcome::AlreadyApplied(order)),
            Err(OrderFlowError::InvalidTransition { from, .. }) => {
                debug!("🛒️ Overdue event for order [{}] in status {from}; ignored", order.order_number);
                return Ok(SettlementOutcome::Ignored);
            },
            Err(e) => return Err(e),
        };
        self.settle_charge(&order, event, ChargeStatus::Expired, LedgerStatus::Cancelled).await?;
        Ok(SettlementOutcome::Applied { order, transaction: None })
    }

    async fn apply_refunded(
        &self,
        order: Order,
        event: &PaymentEvent,
        external_id: &str,
        calculator: &FeeCalculator,
        is_fallback: bool,
    ) -> Result<SettlementOutcome, OrderFlowError> {
        if order.status == OrderStatus::Refunded {
            return Ok(SettlementOutcome::AlreadyApplied(order));
        }
        if self.db.transaction_exists(event.gateway, external_id, TransactionKind::Refund).await? {
            return Ok(SettlementOutcome::AlreadyApplied(order));
        }
        let gross = event.amount.unwrap_or(order.total);
        let note = format!("Refund of {gross} reported by {} [{external_id}].", event.gateway);
        let order = match self.transition_order(order.id, OrderStatus::Refunded, Some(note)).await {
            Ok(order) => order,
            Err(OrderFlowError::InvalidTransition { from, .. }) => {
                warn!("🛒️ Refund event for order [{}] in status {from}; ignored", order.order_number);
                return Ok(SettlementOutcome::Ignored);
            },
            Err(e) => return Err(e),
        };
        let gmv = self.db.gmv_for_current_month().await?;
        let breakdown = calculator.all_fees(gross, order.product_type, gmv, event.gateway, order.payment_method);
        let tx = NewTransaction {
            order_id: order.id,
            gateway: event.gateway,
            external_id: external_id.to_string(),
            kind: TransactionKind::Refund,
            gross_amount: gross,
            gateway_fee: event.gateway_fee.unwrap_or(breakdown.gateway_fee),
            platform_fee: breakdown.plugin_fee,
            net_amount: gross,
            tier_used: breakdown.tier_used,
            is_fallback,
            raw_payload: event.raw.to_string(),
        };
        let transaction = self.db.insert_transaction(tx).await?;
        self.settle_charge(&order, event, ChargeStatus::Refunded, LedgerStatus::Cancelled).await?;
        info!("💰️ Order [{}] refunded: {gross} via {}", order.order_number, event.gateway);
        Ok(SettlementOutcome::Applied { order, transaction: Some(transaction) })
    }

    /// Bring the order's charge (if any) and its ledger entry in line with the settled outcome.
    async fn settle_charge(
        &self,
        order: &Order,
        event: &PaymentEvent,
        charge_status: ChargeStatus,
        ledger_status: LedgerStatus,
    ) -> Result<(), OrderFlowError> {
        let charge = match &event.payment_id {
            Some(pid) => self.db.fetch_charge_by_provider_id(event.gateway, pid).await?,
            None => self.db.fetch_active_charge(order.id).await?,
        };
        let Some(charge) = charge else {
            return Ok(());
        };
        self.db.update_charge_status(charge.id, charge_status).await?;
        match self.db.update_status_by_reference(&charge.charge_id, ledger_status).await {
            Ok(_) => {},
            Err(crate::traits::LedgerError::EntryNotFound(_)) => {
                trace!("🛒️ No ledger entry for charge [{}]", charge.charge_id);
            },
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
