use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use hng_payment_engine::{
    db_types::{BillingInfo, NewOrderItem, Order, PaymentMethod, ProductType},
    events::EventProducers,
    fees::{CachedTierSource, GatewayFeePolicy, DEFAULT_TIER_CACHE_TTL},
    helpers::hmac_sha256_hex,
    order_flow::CheckoutRequest,
    ChargeApi,
    FeeApi,
    OrderFlowApi,
    SqliteDatabase,
};
use hpg_common::{Money, Secret};

use super::mocks::MockPixProvider;
use crate::{
    config::{OrchestratorConfig, ServerConfig},
    orchestrator::{OrchestratorClient, OrchestratorTierSource},
    routes::{
        checkout_session,
        health,
        CreateChargeRoute,
        IncomingWebhookRoute,
        OrderDetailRoute,
        PollChargeRoute,
        RegenerateChargeRoute,
        ShopCheckoutRoute,
    },
    webhook::{WebhookState, SIGNATURE_HEADER},
};

pub const SESSION_SECRET: &str = "test-session-secret";
pub const ASAAS_HOOK_SECRET: &str = "asaas-hook-secret";
pub const MP_HOOK_SECRET: &str = "mp-hook-secret";

/// A config with Asaas, MercadoPago and PicPay enabled and the source checks disabled. PicPay deliberately has no
/// webhook secret.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.session_secret = Secret::new(SESSION_SECRET.into());
    config.gateways.asaas.enabled = true;
    config.gateways.asaas.webhook_secret = Secret::new(ASAAS_HOOK_SECRET.into());
    config.gateways.asaas.whitelist = None;
    config.gateways.mercado_pago.enabled = true;
    config.gateways.mercado_pago.webhook_secret = Secret::new(MP_HOOK_SECRET.into());
    config.gateways.mercado_pago.whitelist = None;
    config.gateways.pic_pay.enabled = true;
    config.gateways.pic_pay.whitelist = None;
    config
}

/// An unconfigured orchestrator client: tier fetches fail (the cached defaults apply) and detail lookups error.
pub fn orchestrator() -> OrchestratorClient {
    OrchestratorClient::new(OrchestratorConfig::default()).expect("Could not build the orchestrator client")
}

pub fn fee_api(db: &SqliteDatabase) -> FeeApi<SqliteDatabase, OrchestratorTierSource> {
    let tiers = CachedTierSource::new(OrchestratorTierSource::new(orchestrator()), DEFAULT_TIER_CACHE_TTL);
    FeeApi::new(db.clone(), tiers, GatewayFeePolicy::default())
}

pub fn billing() -> BillingInfo {
    BillingInfo {
        billing_first_name: "Ana".into(),
        billing_last_name: "Souza".into(),
        billing_email: "ana@example.com".into(),
        billing_phone: "+55 11 91234-5678".into(),
        billing_cpf: "123.456.789-09".into(),
        billing_postcode: "01310-100".into(),
        billing_address_1: "Avenida Paulista 1000".into(),
        billing_city: "São Paulo".into(),
        billing_state: "SP".into(),
    }
}

pub async fn seed_order(db: &SqliteDatabase, method: PaymentMethod) -> Order {
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let request = CheckoutRequest {
        customer_id: "cust_1".into(),
        product_type: ProductType::Physical,
        payment_method: method,
        billing: billing(),
        items: vec![NewOrderItem::new(11, "Mechanical keyboard", 1, Money::from_units(110))],
        shipping_total: Money::ZERO,
        discount_total: Money::ZERO,
        client_ip: None,
        user_agent: None,
    };
    orders.create_from_cart(request).await.expect("Could not seed order").order
}

/// Build the full app and run one request against it. The webhook state is passed in so rate-limit and replay
/// behaviour persists across calls within a test.
pub async fn send(
    db: &SqliteDatabase,
    config: &ServerConfig,
    state: &web::Data<WebhookState>,
    charges: Option<ChargeApi<SqliteDatabase, MockPixProvider>>,
    req: TestRequest,
) -> (StatusCode, String) {
    let app = App::new()
        .app_data(web::Data::new(config.clone()))
        .app_data(web::Data::new(OrderFlowApi::new(db.clone(), EventProducers::default())))
        .app_data(web::Data::new(fee_api(db)))
        .app_data(web::Data::new(charges))
        .app_data(web::Data::new(orchestrator()))
        .app_data(state.clone())
        .service(health)
        .service(checkout_session)
        .service(ShopCheckoutRoute::<SqliteDatabase>::new())
        .service(OrderDetailRoute::<SqliteDatabase>::new())
        .service(CreateChargeRoute::<SqliteDatabase, MockPixProvider>::new())
        .service(PollChargeRoute::<SqliteDatabase, MockPixProvider>::new())
        .service(RegenerateChargeRoute::<SqliteDatabase, MockPixProvider>::new())
        .service(IncomingWebhookRoute::<SqliteDatabase>::new());
    let service = test::init_service(app).await;
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

/// A webhook delivery with a valid `sha256=` signature over `body`.
pub fn signed_webhook(gateway: &str, secret: &str, body: &str) -> TestRequest {
    let signature = hmac_sha256_hex(secret, body.as_bytes());
    TestRequest::post()
        .uri(&format!("/webhook/{gateway}"))
        .insert_header((SIGNATURE_HEADER, format!("sha256={signature}")))
        .set_payload(body.to_string())
}
