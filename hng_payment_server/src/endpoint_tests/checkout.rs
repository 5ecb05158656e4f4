use actix_web::{http::StatusCode, test::TestRequest, web};
use hng_payment_engine::{db_types::PaymentMethod, test_utils::prepare_env::memory_db};
use serde_json::{json, Value};

use super::helpers::{seed_order, send, test_config, SESSION_SECRET};
use crate::{
    orchestrator::OrchestratorClient,
    server::create_server_instance,
    session::issue_session_token,
    webhook::WebhookState,
};

fn state(config: &crate::config::ServerConfig) -> web::Data<WebhookState> {
    web::Data::new(WebhookState::from_config(config))
}

fn checkout_body(session_token: &str) -> Value {
    json!({
        "customer_id": "cust_1",
        "billing_first_name": "Ana",
        "billing_last_name": "Souza",
        "billing_email": "ana@example.com",
        "billing_phone": "+55 11 91234-5678",
        "billing_cpf": "123.456.789-09",
        "billing_postcode": "01310-100",
        "billing_address_1": "Avenida Paulista 1000",
        "billing_city": "São Paulo",
        "billing_state": "SP",
        "payment_method": "pix",
        "items": [
            { "product_id": 11, "name": "Mechanical keyboard", "quantity": 1, "unit_price": 11000 }
        ],
        "terms": true,
        "session_token": session_token,
    })
}

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let (status, body) = send(&db, &config, &state, None, TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn session_token_roundtrip() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let (status, body) = send(&db, &config, &state, None, TestRequest::get().uri("/checkout/session")).await;
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).unwrap();
    let token = response["session_token"].as_str().unwrap();

    let req = TestRequest::post().uri("/checkout").set_json(checkout_body(token));
    let (status, body) = send(&db, &config, &state, None, req).await;
    assert_eq!(status, StatusCode::OK, "unexpected response: {body}");
}

#[actix_web::test]
async fn checkout_rejects_a_bad_session_token() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let req = TestRequest::post().uri("/checkout").set_json(checkout_body("1.bogus.nope"));
    let (status, _) = send(&db, &config, &state, None, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn checkout_requires_accepted_terms() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let mut body = checkout_body(&issue_session_token(SESSION_SECRET));
    body["terms"] = json!(false);
    let req = TestRequest::post().uri("/checkout").set_json(body);
    let (status, _) = send(&db, &config, &state, None, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn checkout_requires_complete_billing_details() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let mut body = checkout_body(&issue_session_token(SESSION_SECRET));
    body["billing_cpf"] = json!("");
    let req = TestRequest::post().uri("/checkout").set_json(body);
    let (status, response) = send(&db, &config, &state, None, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response.contains("billing_cpf"), "unexpected body: {response}");
}

#[actix_web::test]
async fn checkout_with_no_capable_gateway_is_refused() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let mut config = test_config();
    config.gateways.asaas.enabled = false;
    config.gateways.mercado_pago.enabled = false;
    config.gateways.pic_pay.enabled = false;
    let state = state(&config);
    let req = TestRequest::post().uri("/checkout").set_json(checkout_body(&issue_session_token(SESSION_SECRET)));
    let (status, response) = send(&db, &config, &state, None, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response.contains("invalid_payment"), "unexpected body: {response}");
}

#[actix_web::test]
async fn pix_checkout_creates_a_pending_order() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let req = TestRequest::post().uri("/checkout").set_json(checkout_body(&issue_session_token(SESSION_SECRET)));
    let (status, body) = send(&db, &config, &state, None, req).await;
    assert_eq!(status, StatusCode::OK, "unexpected response: {body}");
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["status"], "pending");
    assert_eq!(response["payment_method"], "pix");
    assert_eq!(response["total"], 11000);
    assert!(response["payment_id"].is_null());
    let redirect = response["redirect_to"].as_str().unwrap();
    assert!(redirect.contains("/charge"), "unexpected redirect: {redirect}");
}

#[actix_web::test]
async fn card_checkout_survives_an_orchestrator_outage() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let mut body = checkout_body(&issue_session_token(SESSION_SECRET));
    body["payment_method"] = json!("credit_card");
    let req = TestRequest::post().uri("/checkout").set_json(body);
    let (status, response) = send(&db, &config, &state, None, req).await;
    // The unconfigured orchestrator is a non-fatal failure: the order goes through on local fees.
    assert_eq!(status, StatusCode::OK, "unexpected response: {response}");
    let response: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(response["status"], "pending");
    assert!(response["payment_id"].is_null());
}

#[actix_web::test]
async fn server_instance_builds_and_binds() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let mut config = test_config();
    config.host = "127.0.0.1".into();
    config.port = 0;
    let orchestrator = OrchestratorClient::new(config.orchestrator.clone()).unwrap();
    let server = create_server_instance(config, db, orchestrator, None);
    assert!(server.is_ok(), "the server should bind an ephemeral port");
}

#[actix_web::test]
async fn order_detail_requires_the_access_key() {
    let _ = env_logger::try_init().ok();
    let db = memory_db().await;
    let config = test_config();
    let state = state(&config);
    let order = seed_order(&db, PaymentMethod::Pix).await;

    let req = TestRequest::get().uri(&format!("/order/{}?key=HNG-999999", order.id));
    let (status, _) = send(&db, &config, &state, None, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = TestRequest::get().uri(&format!("/order/{}?key={}", order.id, order.order_number.as_str()));
    let (status, body) = send(&db, &config, &state, None, req).await;
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["order"]["id"], order.id);
    assert_eq!(response["items"].as_array().unwrap().len(), 1);
}
