//! Request and response bodies for the HTTP surface.
use chrono::{DateTime, Utc};
use hng_payment_engine::db_types::{
    BillingInfo,
    Charge,
    ChargeStatus,
    NewOrderItem,
    Order,
    OrderItem,
    OrderStatus,
    PaymentMethod,
    ProductType,
};
use hpg_common::Money;
use serde::{Deserialize, Serialize};

/// The standard `{success, message}` envelope for webhook and mutation responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<T: Into<String>>(message: T) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<T: Into<String>>(message: T) -> Self {
        Self { success: false, message: message.into() }
    }
}

//-------------------------------------------------  Checkout  ---------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    /// Unit price in cents.
    pub unit_price: Money,
    #[serde(default)]
    pub custom_fields: Option<String>,
}

/// The checkout submission. Billing fields are flattened so the storefront can post its form fields directly.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutPayload {
    pub customer_id: String,
    #[serde(flatten)]
    pub billing: BillingInfo,
    #[serde(default)]
    pub shipping_method: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub product_type: ProductType,
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub shipping_total: Money,
    #[serde(default)]
    pub discount_total: Money,
    /// Must be true; unticked terms are a validation error.
    #[serde(default)]
    pub terms: bool,
    /// The session token issued by `GET /checkout/session`.
    #[serde(default)]
    pub session_token: String,
}

impl CheckoutPayload {
    pub fn items_with_commission(&self, rate_bps: i64) -> Vec<NewOrderItem> {
        self.items
            .iter()
            .map(|line| {
                let mut item = NewOrderItem::new(line.product_id, line.name.clone(), line.quantity, line.unit_price);
                item.commission_rate_bps = rate_bps;
                if let Some(fields) = &line.custom_fields {
                    item.custom_fields = fields.clone();
                }
                item
            })
            .collect()
    }
}

/// Returned on successful checkout; the storefront redirects to the confirmation page with these parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub order_id: i64,
    /// The order number; doubles as the confirmation-page access key.
    pub key: String,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub total: Money,
    /// Present when a payment was created synchronously during checkout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub redirect_to: String,
}

/// The access key for customer-facing order endpoints: the order number, handed out once at checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderKeyQuery {
    pub key: String,
}

/// The confirmation-page view of an order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

//-------------------------------------------------  Charges  ----------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeResponse {
    pub charge_id: String,
    pub status: ChargeStatus,
    pub qr_code: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<Charge> for ChargeResponse {
    fn from(charge: Charge) -> Self {
        Self { charge_id: charge.charge_id, status: charge.status, qr_code: charge.qr_code, expires_at: charge.expires_at }
    }
}

/// The short-poll response for the payment-pending page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub status: ChargeStatus,
    pub order_status: OrderStatus,
    pub expires_at: DateTime<Utc>,
}

//-------------------------------------------------  Sessions  ---------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokenResponse {
    pub session_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentRequest {
    pub audience: String,
}
