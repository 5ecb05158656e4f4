use chrono::{DateTime, Utc};
use hpg_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{
    BillingInfo,
    Charge,
    ChargeStatus,
    NewOrderItem,
    Order,
    OrderItem,
    PaymentEvent,
    PaymentMethod,
    ProductType,
    Transaction,
};

/// Everything checkout hands to [`crate::order_flow::OrderFlowApi::create_from_cart`]. The per-item commission rates
/// have already been resolved by the caller (via [`crate::order_flow::FeeApi`]) when this is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub product_type: ProductType,
    pub payment_method: PaymentMethod,
    pub billing: BillingInfo,
    pub items: Vec<NewOrderItem>,
    pub shipping_total: Money,
    pub discount_total: Money,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl CheckoutRequest {
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(|i| i.line_subtotal()).sum()
    }

    pub fn commission(&self) -> Money {
        self.items.iter().map(|i| i.commission_amount()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl CheckoutOutcome {
    /// The item count the caller should verify against the cart size before declaring checkout successful.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

/// What applying a payment event did.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// The event changed order state. `transaction` is present for settlements and refunds.
    Applied { order: Order, transaction: Option<Transaction> },
    /// The order was already in the target state, or the transaction already recorded. Nothing changed.
    AlreadyApplied(Order),
    /// The event carried nothing actionable (unknown vocabulary, or no order state to change).
    Ignored,
}

/// The result of a short-poll against the provider.
#[derive(Debug, Clone)]
pub struct ChargePoll {
    pub charge: Charge,
    pub status: ChargeStatus,
    pub expires_at: DateTime<Utc>,
    /// A normalized event for the caller to feed through `OrderFlowApi::apply_payment_event` when the provider
    /// status implies an order change. Poll and webhook are two producers of the same transition function.
    pub event: Option<PaymentEvent>,
}
