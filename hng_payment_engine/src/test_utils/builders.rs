//! Record builders and a programmable in-memory provider for tests.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{Duration, Utc};
use hpg_common::Money;

use crate::{
    db_types::{BillingInfo, ChargeStatus, GatewayId, NewOrderItem, PaymentMethod, ProductType},
    order_flow::CheckoutRequest,
    traits::{ChargeRequest, PaymentProvider, ProviderCharge, ProviderError},
};

pub fn billing_fixture() -> BillingInfo {
    BillingInfo {
        billing_first_name: "Ana".into(),
        billing_last_name: "Souza".into(),
        billing_email: "ana.souza@example.com".into(),
        billing_phone: "+55 11 91234-5678".into(),
        billing_cpf: "123.456.789-09".into(),
        billing_postcode: "01310-100".into(),
        billing_address_1: "Av. Paulista, 1000".into(),
        billing_city: "São Paulo".into(),
        billing_state: "SP".into(),
    }
}

/// A one-line cart: `quantity` × `unit_price` of a widget with a 1.99% commission rate.
pub fn cart_line(quantity: i64, unit_price: Money) -> NewOrderItem {
    let mut item = NewOrderItem::new(1001, "Widget", quantity, unit_price);
    item.commission_rate_bps = 199;
    item
}

pub fn checkout_fixture(items: Vec<NewOrderItem>) -> CheckoutRequest {
    CheckoutRequest {
        customer_id: "cust-42".into(),
        product_type: ProductType::Physical,
        payment_method: PaymentMethod::Pix,
        billing: billing_fixture(),
        items,
        shipping_total: Money::ZERO,
        discount_total: Money::ZERO,
        client_ip: Some("203.0.113.7".into()),
        user_agent: Some("test-agent".into()),
    }
}

/// A [`PaymentProvider`] whose responses the test controls. Charges are issued sequentially; `set_status` scripts
/// what `get_status` returns for each charge id.
#[derive(Clone)]
pub struct ScriptedProvider {
    gateway: GatewayId,
    state: Arc<Mutex<ScriptedState>>,
}

struct ScriptedState {
    next_id: u64,
    statuses: HashMap<String, ChargeStatus>,
    cancelled: Vec<String>,
    lifetime: Duration,
}

impl ScriptedProvider {
    pub fn new(gateway: GatewayId) -> Self {
        let state = ScriptedState {
            next_id: 1,
            statuses: HashMap::new(),
            cancelled: Vec::new(),
            lifetime: Duration::hours(1),
        };
        Self { gateway, state: Arc::new(Mutex::new(state)) }
    }

    /// Make freshly created charges expire `lifetime` from now (negative values create pre-expired charges).
    pub fn with_lifetime(self, lifetime: Duration) -> Self {
        self.state.lock().unwrap().lifetime = lifetime;
        self
    }

    pub fn set_status(&self, charge_id: &str, status: ChargeStatus) {
        self.state.lock().unwrap().statuses.insert(charge_id.to_string(), status);
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }
}

impl PaymentProvider for ScriptedProvider {
    fn gateway(&self) -> GatewayId {
        self.gateway
    }

    async fn create_charge(&self, _request: &ChargeRequest) -> Result<ProviderCharge, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let charge_id = format!("chg_{:04}", state.next_id);
        state.next_id += 1;
        state.statuses.insert(charge_id.clone(), ChargeStatus::Created);
        Ok(ProviderCharge {
            charge_id: charge_id.clone(),
            qr_code: Some(format!("00020126BR.GOV.BCB.PIX.{charge_id}")),
            expires_at: Utc::now() + state.lifetime,
        })
    }

    async fn get_status(&self, charge_id: &str) -> Result<ChargeStatus, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .statuses
            .get(charge_id)
            .copied()
            .ok_or_else(|| ProviderError::UnknownCharge(charge_id.to_string()))
    }

    async fn cancel_charge(&self, charge_id: &str) -> Result<(), ProviderError> {
        self.state.lock().unwrap().cancelled.push(charge_id.to_string());
        Ok(())
    }

    async fn refund(&self, charge_id: &str, _amount: Option<Money>) -> Result<(), ProviderError> {
        self.set_status(charge_id, ChargeStatus::Refunded);
        Ok(())
    }

    fn supports_partial_refund(&self) -> bool {
        false
    }
}
