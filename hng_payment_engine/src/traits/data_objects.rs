use chrono::{DateTime, Duration, Utc};
use hpg_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{GatewayId, OrderId, OrderStatus, PaymentMethod};

/// A search filter for orders. Empty fields are ignored; all present fields must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub customer_id: Option<String>,
    pub status: Option<OrderStatus>,
    pub gateway: Option<GatewayId>,
    pub payment_method: Option<PaymentMethod>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none()
            && self.status.is_none()
            && self.gateway.is_none()
            && self.payment_method.is_none()
            && self.since.is_none()
            && self.until.is_none()
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }
}

/// What a provider needs to open a charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub order_id: i64,
    pub order_number: OrderId,
    pub amount: Money,
    pub customer_email: String,
    pub customer_name: String,
    pub expires_in: Duration,
}

/// What a provider returns when a charge is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCharge {
    /// The provider's identifier for the charge.
    pub charge_id: String,
    /// The PIX copy-and-paste BR Code, when the provider returns one inline.
    pub qr_code: Option<String>,
    pub expires_at: DateTime<Utc>,
}
