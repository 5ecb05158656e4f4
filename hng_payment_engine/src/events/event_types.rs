use serde::{Deserialize, Serialize};

use crate::db_types::{GatewayId, Money, Order, OrderStatus, Transaction};

/// Fired when `create_from_cart` commits a new order. Listeners handle stock decrement, sales counters and cart
/// clearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
    pub item_count: usize,
}

impl OrderCreatedEvent {
    pub fn new(order: Order, item_count: usize) -> Self {
        Self { order, item_count }
    }
}

/// Fired exactly once per settled payment, after the order has transitioned and the transaction row committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmedEvent {
    pub order: Order,
    pub transaction: Transaction,
    pub gateway: GatewayId,
    pub amount: Money,
}

impl PaymentConfirmedEvent {
    pub fn new(order: Order, transaction: Transaction) -> Self {
        let gateway = transaction.gateway;
        let amount = transaction.gross_amount;
        Self { order, transaction, gateway, amount }
    }
}

/// Fired when an order leaves the live flow (cancelled, failed or refunded). Listeners restore stock and notify the
/// customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatus,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

/// Fired on every applied status transition, including those that also fire one of the more specific events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub order: Order,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
}

impl StatusChangedEvent {
    pub fn new(order: Order, old_status: OrderStatus) -> Self {
        let new_status = order.status;
        Self { order, old_status, new_status }
    }
}
