//! Database types for the settlement engine.
//!
//! These are the records that the storage backends persist, plus the `New*` types used to create them. They are
//! public; everything else about the database is reached through the traits in [`crate::traits`].
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use hpg_common::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------      GatewayId       ---------------------------------------------------------
/// The payment gateways the platform can settle against.
///
/// This is a closed set: adding a gateway means adding a variant here and an adapter arm in the server, and the
/// compiler will point out every match that needs extending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GatewayId {
    Asaas,
    MercadoPago,
    PagSeguro,
    PicPay,
}

impl GatewayId {
    pub const ALL: [GatewayId; 4] = [GatewayId::Asaas, GatewayId::MercadoPago, GatewayId::PagSeguro, GatewayId::PicPay];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayId::Asaas => "asaas",
            GatewayId::MercadoPago => "mercadopago",
            GatewayId::PagSeguro => "pagseguro",
            GatewayId::PicPay => "picpay",
        }
    }

    /// The fixed gateway preference order for each payment method. Checkout picks the first enabled entry.
    pub fn preference_for(method: PaymentMethod) -> &'static [GatewayId] {
        match method {
            PaymentMethod::Pix => {
                &[GatewayId::Asaas, GatewayId::MercadoPago, GatewayId::PagSeguro, GatewayId::PicPay]
            },
            PaymentMethod::CreditCard => &[GatewayId::MercadoPago, GatewayId::PagSeguro, GatewayId::Asaas],
            PaymentMethod::Boleto => &[GatewayId::Asaas, GatewayId::PagSeguro],
        }
    }
}

impl Display for GatewayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asaas" => Ok(GatewayId::Asaas),
            "mercadopago" => Ok(GatewayId::MercadoPago),
            "pagseguro" => Ok(GatewayId::PagSeguro),
            "picpay" => Ok(GatewayId::PicPay),
            other => Err(ConversionError(format!("Unknown gateway: {other}"))),
        }
    }
}

//--------------------------------------    PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    CreditCard,
    Boleto,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Pix => write!(f, "pix"),
            PaymentMethod::CreditCard => write!(f, "credit_card"),
            PaymentMethod::Boleto => write!(f, "boleto"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pix" => Ok(PaymentMethod::Pix),
            "credit_card" | "creditcard" => Ok(PaymentMethod::CreditCard),
            "boleto" => Ok(PaymentMethod::Boleto),
            other => Err(ConversionError(format!("Unknown payment method: {other}"))),
        }
    }
}

//--------------------------------------     ProductType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    #[default]
    Physical,
    Digital,
    Subscription,
    Quote,
    Appointment,
}

impl Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProductType::Physical => "physical",
            ProductType::Digital => "digital",
            ProductType::Subscription => "subscription",
            ProductType::Quote => "quote",
            ProductType::Appointment => "appointment",
        };
        f.write_str(s)
    }
}

impl FromStr for ProductType {
    type Err = ConversionError;

    /// Unknown product types fall back to `Physical`, which carries the most conservative fee schedule.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pt = match s.to_ascii_lowercase().as_str() {
            "digital" => ProductType::Digital,
            "subscription" => ProductType::Subscription,
            "quote" => ProductType::Quote,
            "appointment" => ProductType::Appointment,
            _ => ProductType::Physical,
        };
        Ok(pt)
    }
}

//--------------------------------------     OrderStatus      ---------------------------------------------------------
/// The order lifecycle state.
///
/// Valid transitions are encoded in [`OrderStatus::can_transition_to`]; everything funnels through
/// `OrderFlowApi::transition_order`, so a transition that isn't in the table can't happen by accident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    OnHold,
    Cancelled,
    Refunded,
    PendingApproval,
    QuoteSent,
    QuoteApproved,
    QuoteRejected,
    AwaitingPayment,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::OnHold => "on-hold",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::PendingApproval => "pending-approval",
            OrderStatus::QuoteSent => "quote-sent",
            OrderStatus::QuoteApproved => "quote-approved",
            OrderStatus::QuoteRejected => "quote-rejected",
            OrderStatus::AwaitingPayment => "awaiting-payment",
        }
    }

    /// True for statuses in which the order's payment has been received.
    pub fn is_paid(&self) -> bool {
        matches!(self, OrderStatus::Processing | OrderStatus::Completed)
    }

    /// Whether the state machine permits moving from `self` to `to`. A same-state move is not in the table; callers
    /// treat it as an idempotent no-op rather than an error.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (*self, to),
            (Pending, Processing | Failed | OnHold)
                | (OnHold, Processing | Cancelled)
                | (Processing, Completed | Refunded)
                | (Completed, Refunded)
                | (PendingApproval, QuoteSent)
                | (QuoteSent, QuoteApproved | QuoteRejected)
                | (QuoteApproved, AwaitingPayment)
                | (AwaitingPayment, Processing)
        )
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use OrderStatus::*;
        match s {
            "pending" => Ok(Pending),
            "processing" => Ok(Processing),
            "completed" => Ok(Completed),
            "failed" => Ok(Failed),
            "on-hold" => Ok(OnHold),
            "cancelled" => Ok(Cancelled),
            "refunded" => Ok(Refunded),
            "pending-approval" => Ok(PendingApproval),
            "quote-sent" => Ok(QuoteSent),
            "quote-approved" => Ok(QuoteApproved),
            "quote-rejected" => Ok(QuoteRejected),
            "awaiting-payment" => Ok(AwaitingPayment),
            other => Err(ConversionError(format!("Invalid order status: {other}"))),
        }
    }
}

//--------------------------------------       OrderId        ---------------------------------------------------------
/// The human-readable, sequential order number (e.g. `HNG-000042`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     BillingInfo      ---------------------------------------------------------
/// The billing snapshot captured at checkout. Stored denormalized on the order row; the order is the record of what
/// the customer entered, not a pointer into a mutable address book.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BillingInfo {
    pub billing_first_name: String,
    pub billing_last_name: String,
    pub billing_email: String,
    pub billing_phone: String,
    pub billing_cpf: String,
    pub billing_postcode: String,
    pub billing_address_1: String,
    pub billing_city: String,
    pub billing_state: String,
}

impl BillingInfo {
    /// The required fields, paired with their checkout form names. A checkout request missing any of these is a
    /// validation error before anything is persisted.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let fields: [(&str, &str); 9] = [
            ("billing_first_name", &self.billing_first_name),
            ("billing_last_name", &self.billing_last_name),
            ("billing_email", &self.billing_email),
            ("billing_phone", &self.billing_phone),
            ("billing_cpf", &self.billing_cpf),
            ("billing_postcode", &self.billing_postcode),
            ("billing_address_1", &self.billing_address_1),
            ("billing_city", &self.billing_city),
            ("billing_state", &self.billing_state),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                missing.push(name);
            }
        }
        missing
    }
}

//--------------------------------------        Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: OrderId,
    pub customer_id: String,
    pub status: OrderStatus,
    pub product_type: ProductType,
    pub subtotal: Money,
    pub shipping_total: Money,
    pub discount_total: Money,
    pub total: Money,
    pub commission: Money,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub gateway: Option<GatewayId>,
    pub transaction_id: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub billing: BillingInfo,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub product_type: ProductType,
    pub subtotal: Money,
    pub shipping_total: Money,
    pub discount_total: Money,
    pub commission: Money,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub billing: BillingInfo,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl NewOrder {
    pub fn new(customer_id: String, subtotal: Money, payment_method: PaymentMethod) -> Self {
        Self {
            customer_id,
            product_type: ProductType::default(),
            subtotal,
            shipping_total: Money::ZERO,
            discount_total: Money::ZERO,
            commission: Money::ZERO,
            currency: hpg_common::DEFAULT_CURRENCY_CODE.to_string(),
            payment_method,
            billing: BillingInfo::default(),
            client_ip: None,
            user_agent: None,
        }
    }

    /// The order total. This is the only place it is computed, so `total == subtotal + shipping - discount` holds for
    /// every persisted order by construction.
    pub fn total(&self) -> Money {
        self.subtotal + self.shipping_total - self.discount_total
    }
}

//--------------------------------------      OrderItem       ---------------------------------------------------------
/// Immutable snapshot of one cart line, written atomically with its order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_subtotal: Money,
    pub commission_rate_bps: i64,
    pub commission_amount: Money,
    /// Arbitrary key/value pairs captured from the cart, as a JSON object string.
    pub custom_fields: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub commission_rate_bps: i64,
    #[serde(default = "empty_json_object")]
    pub custom_fields: String,
}

fn empty_json_object() -> String {
    "{}".to_string()
}

impl NewOrderItem {
    pub fn new(product_id: i64, name: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        Self {
            product_id,
            name: name.into(),
            quantity,
            unit_price,
            commission_rate_bps: 0,
            custom_fields: empty_json_object(),
        }
    }

    pub fn line_subtotal(&self) -> Money {
        self.unit_price * self.quantity
    }

    pub fn commission_amount(&self) -> Money {
        self.line_subtotal().percentage_bps(self.commission_rate_bps)
    }
}

//--------------------------------------      OrderNote       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderNote {
    pub id: i64,
    pub order_id: i64,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     Transaction      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Settlement,
    Refund,
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Settlement => write!(f, "settlement"),
            TransactionKind::Refund => write!(f, "refund"),
        }
    }
}

/// An immutable financial fact: one row per settled payment or refund event. Never updated, only inserted.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub order_id: i64,
    pub gateway: GatewayId,
    /// The gateway's identifier for the underlying payment.
    pub external_id: String,
    pub kind: TransactionKind,
    pub gross_amount: Money,
    pub gateway_fee: Money,
    pub platform_fee: Money,
    pub net_amount: Money,
    pub tier_used: i64,
    /// True when the fees were computed locally instead of validated by the orchestrator.
    pub is_fallback: bool,
    /// The raw provider payload that triggered this transaction, for audit.
    pub raw_payload: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub order_id: i64,
    pub gateway: GatewayId,
    pub external_id: String,
    pub kind: TransactionKind,
    pub gross_amount: Money,
    pub gateway_fee: Money,
    pub platform_fee: Money,
    pub net_amount: Money,
    pub tier_used: i64,
    pub is_fallback: bool,
    pub raw_payload: String,
}

//--------------------------------------       Charge         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Created,
    Paid,
    Expired,
    Refunded,
}

impl Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChargeStatus::Created => "created",
            ChargeStatus::Paid => "paid",
            ChargeStatus::Expired => "expired",
            ChargeStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

impl FromStr for ChargeStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(ChargeStatus::Created),
            "paid" => Ok(ChargeStatus::Paid),
            "expired" => Ok(ChargeStatus::Expired),
            "refunded" => Ok(ChargeStatus::Refunded),
            other => Err(ConversionError(format!("Invalid charge status: {other}"))),
        }
    }
}

/// A provider-side asynchronous payment request (PIX). At most one active charge per order; expired charges are
/// superseded by regeneration, never edited.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Charge {
    pub id: i64,
    pub order_id: i64,
    pub gateway: GatewayId,
    /// The provider's identifier for this charge.
    pub charge_id: String,
    /// The PIX "copy and paste" BR Code the storefront renders as a QR code.
    pub qr_code: Option<String>,
    pub status: ChargeStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCharge {
    pub order_id: i64,
    pub gateway: GatewayId,
    pub charge_id: String,
    pub qr_code: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChargeStatusEntry {
    pub id: i64,
    pub charge_id: i64,
    pub status: ChargeStatus,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    PaymentEvent      ---------------------------------------------------------
/// Normalized payment event kinds. Gateway adapters map their provider-specific vocabulary onto this set; anything
/// they can't map is logged and dropped before it reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentEventKind {
    Created,
    Paid,
    Overdue,
    Refunded,
}

/// A normalized provider event, produced by a gateway adapter (webhook) or the charge poller. Both paths feed
/// `OrderFlowApi::apply_payment_event`, which is idempotent, so delivery order and duplication don't matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub gateway: GatewayId,
    pub kind: PaymentEventKind,
    /// The provider's unique event id, when the provider supplies one. Used for replay detection.
    pub event_id: Option<String>,
    /// The provider's payment identifier. The primary key for locating the target order.
    pub payment_id: Option<String>,
    /// An order reference embedded in the payload (e.g. Asaas `externalReference`). Secondary order lookup.
    pub order_ref: Option<OrderId>,
    pub amount: Option<Money>,
    pub gateway_fee: Option<Money>,
    pub raw: Value,
}

impl PaymentEvent {
    pub fn new(gateway: GatewayId, kind: PaymentEventKind) -> Self {
        Self {
            gateway,
            kind,
            event_id: None,
            payment_id: None,
            order_ref: None,
            amount: None,
            gateway_fee: None,
            raw: Value::Null,
        }
    }
}

//--------------------------------------   WebhookEventRow    ---------------------------------------------------------
/// Durable idempotency marker: proof that a provider event id has been accepted for processing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookEventRow {
    pub id: i64,
    pub gateway: GatewayId,
    pub event_id: String,
    pub received_at: DateTime<Utc>,
}

//--------------------------------------     LedgerEntry      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Pending,
    Settled,
    Cancelled,
}

impl Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Settled => "settled",
            LedgerStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A lightweight ledger line used by the charge manager and the reconciliation sweep. Full double-entry bookkeeping
/// belongs to the external ledger collaborator; this is only what settlement itself needs to track.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub order_id: i64,
    pub method: PaymentMethod,
    pub status: LedgerStatus,
    pub amount: Money,
    /// The provider-side reference (charge id or payment id) this entry tracks.
    pub reference: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
