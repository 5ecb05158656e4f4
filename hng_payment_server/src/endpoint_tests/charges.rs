use actix_web::{http::StatusCode, test::TestRequest, web};
use chrono::{Duration, Utc};
use hng_payment_engine::{
    db_types::{ChargeStatus, GatewayId, OrderStatus, PaymentMethod},
    events::EventProducers,
    test_utils::prepare_env::memory_db,
    traits::ProviderCharge,
    ChargeApi,
    OrderFlowApi,
    SqliteDatabase,
};
use serde_json::Value;

use super::{
    helpers::{seed_order, send, test_config},
    mocks::MockPixProvider,
};
use crate::webhook::WebhookState;

fn state(config: &crate::config::ServerConfig) -> web::Data<WebhookState> {
    web::Data::new(WebhookState::from_config(config))
}

fn charge_api(db: &SqliteDatabase, provider: MockPixProvider) -> Option<ChargeApi<SqliteDatabase, MockPixProvider>> {
    Some(ChargeApi::new(db.clone(), provider))
}

/// A provider that opens charges with a one-hour expiry.
fn opening_provider() -> MockPixProvider {
    let mut provider = MockPixProvider::new();
    provider.expect_gateway().return_const(GatewayId::Asaas);
    provider.expect_create_charge().returning(|request| {
        Ok(ProviderCharge {
            charge_id: format!("pix_{}", request.order_id),
            qr_code: Some("00020126580014br.gov.bcb.pix".into()),
            expires_at: Utc::now() + Duration::hours(1),
        })
    });
    provider
}

#[actix_web::test]
async fn charge_endpoints_refuse_without_a_pix_provider() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let order = seed_order(&db, PaymentMethod::Pix).await;
    let req = TestRequest::post().uri(&format!("/order/{}/charge?key={}", order.id, order.order_number.as_str()));
    let (status, body) = send(&db, &config, &state, None, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("PIX"), "unexpected body: {body}");
}

#[actix_web::test]
async fn charge_endpoints_enforce_the_access_key() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let order = seed_order(&db, PaymentMethod::Pix).await;
    // The provider must never be consulted for a request that fails the key check.
    let req = TestRequest::post().uri(&format!("/order/{}/charge?key=HNG-999999", order.id));
    let (status, _) = send(&db, &config, &state, charge_api(&db, MockPixProvider::new()), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn create_charge_returns_a_payable_charge() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let order = seed_order(&db, PaymentMethod::Pix).await;
    let req = TestRequest::post().uri(&format!("/order/{}/charge?key={}", order.id, order.order_number.as_str()));
    let (status, body) = send(&db, &config, &state, charge_api(&db, opening_provider()), req).await;
    assert_eq!(status, StatusCode::OK, "unexpected response: {body}");
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["charge_id"], format!("pix_{}", order.id));
    assert_eq!(response["status"], "created");
    assert!(response["qr_code"].as_str().unwrap().contains("br.gov.bcb.pix"));
}

#[actix_web::test]
async fn create_charge_is_idempotent_while_live() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let order = seed_order(&db, PaymentMethod::Pix).await;
    let uri = format!("/order/{}/charge?key={}", order.id, order.order_number.as_str());

    let (status, first) = send(&db, &config, &state, charge_api(&db, opening_provider()), TestRequest::post().uri(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    // The second request finds the live charge in the database and does not touch the provider.
    let quiet = MockPixProvider::new();
    let (status, second) = send(&db, &config, &state, charge_api(&db, quiet), TestRequest::post().uri(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    let first: Value = serde_json::from_str(&first).unwrap();
    let second: Value = serde_json::from_str(&second).unwrap();
    assert_eq!(first["charge_id"], second["charge_id"]);
}

#[actix_web::test]
async fn poll_settles_a_paid_charge() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let order = seed_order(&db, PaymentMethod::Pix).await;
    let uri = format!("/order/{}/charge?key={}", order.id, order.order_number.as_str());

    let (status, _) = send(&db, &config, &state, charge_api(&db, opening_provider()), TestRequest::post().uri(&uri)).await;
    assert_eq!(status, StatusCode::OK);

    let mut provider = MockPixProvider::new();
    provider.expect_get_status().returning(|_| Ok(ChargeStatus::Paid));
    let (status, body) = send(&db, &config, &state, charge_api(&db, provider), TestRequest::get().uri(&uri)).await;
    assert_eq!(status, StatusCode::OK, "unexpected response: {body}");
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["status"], "paid");
    assert_eq!(response["order_status"], "processing");

    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let settled = orders.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(settled.status, OrderStatus::Processing);
    let transactions = orders.fetch_transactions(order.id).await.unwrap();
    assert_eq!(transactions.len(), 1);
    // No provider-reported fee on a poll, so the fee table supplied the numbers.
    assert!(transactions[0].is_fallback);
}

#[actix_web::test]
async fn poll_without_a_charge_is_404() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let order = seed_order(&db, PaymentMethod::Pix).await;
    let uri = format!("/order/{}/charge?key={}", order.id, order.order_number.as_str());
    let (status, _) = send(&db, &config, &state, charge_api(&db, MockPixProvider::new()), TestRequest::get().uri(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn regenerate_refuses_a_live_charge() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let order = seed_order(&db, PaymentMethod::Pix).await;
    let uri = format!("/order/{}/charge?key={}", order.id, order.order_number.as_str());

    let (status, _) = send(&db, &config, &state, charge_api(&db, opening_provider()), TestRequest::post().uri(&uri)).await;
    assert_eq!(status, StatusCode::OK);

    let regen = format!("/order/{}/charge/regenerate?key={}", order.id, order.order_number.as_str());
    let (status, body) = send(&db, &config, &state, charge_api(&db, MockPixProvider::new()), TestRequest::post().uri(&regen)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "unexpected response: {body}");
}
