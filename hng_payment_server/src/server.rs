use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use hng_payment_engine::{
    db_types::PaymentMethod,
    events::{EventHandlers, EventHooks},
    fees::{CachedTierSource, GatewayFeePolicy, DEFAULT_TIER_CACHE_TTL},
    ChargeApi,
    FeeApi,
    OrderFlowApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    orchestrator::{OrchestratorClient, OrchestratorTierSource},
    providers::RestPixProvider,
    reconcile_worker::start_reconcile_worker,
    routes::{
        checkout_session,
        create_checkout_intent,
        health,
        verify_checkout_intent,
        CreateChargeRoute,
        IncomingWebhookRoute,
        OrderDetailRoute,
        PollChargeRoute,
        RegenerateChargeRoute,
        ShopCheckoutRoute,
    },
    webhook::WebhookState,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let orchestrator = OrchestratorClient::new(config.orchestrator.clone())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let pix_provider = match config.gateways.gateway_for(PaymentMethod::Pix) {
        Some(gateway) => RestPixProvider::from_config(config.gateways.get(gateway))?,
        None => None,
    };
    match &pix_provider {
        Some(_) => info!("🧲️ PIX charges are enabled"),
        None => warn!("🧲️ No PIX-capable gateway is configured. PIX checkout will be refused."),
    }
    start_reconcile_worker(&config, db.clone(), orchestrator.clone(), pix_provider.clone());
    let srv = create_server_instance(config, db, orchestrator, pix_provider)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    orchestrator: OrchestratorClient,
    pix_provider: Option<RestPixProvider>,
) -> Result<Server, ServerError> {
    // Event handlers are spawned once; the producer handles are cloned into every worker's APIs.
    let handlers = EventHandlers::new(16, logging_hooks());
    let producers = handlers.producers();
    tokio::spawn(handlers.start_handlers());
    // Shared across workers: the rate limiter and replay cache must see every delivery.
    let webhook_state = web::Data::new(WebhookState::from_config(&config));
    let bind_address = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let tiers = CachedTierSource::new(OrchestratorTierSource::new(orchestrator.clone()), DEFAULT_TIER_CACHE_TTL);
        let fee_api = FeeApi::new(db.clone(), tiers, GatewayFeePolicy::default());
        let charge_api = pix_provider.clone().map(|provider| ChargeApi::new(db.clone(), provider));
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("hng::access_log"))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(fee_api))
            .app_data(web::Data::new(charge_api))
            .app_data(web::Data::new(orchestrator.clone()))
            .app_data(webhook_state.clone())
            .service(health)
            .service(checkout_session)
            .service(create_checkout_intent)
            .service(verify_checkout_intent)
            .service(ShopCheckoutRoute::<SqliteDatabase>::new())
            .service(OrderDetailRoute::<SqliteDatabase>::new())
            .service(CreateChargeRoute::<SqliteDatabase, RestPixProvider>::new())
            .service(PollChargeRoute::<SqliteDatabase, RestPixProvider>::new())
            .service(RegenerateChargeRoute::<SqliteDatabase, RestPixProvider>::new())
            .service(IncomingWebhookRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind(bind_address)?
    .run();
    Ok(srv)
}

/// The default listeners: settlement outcomes land in the log. Deployments wanting stock, e-mail or ledger-export
/// side effects register their own hooks here.
fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_payment_confirmed(|ev| {
        Box::pin(async move {
            info!(
                "💰️ Payment of {} via {} confirmed for order [{}]",
                ev.amount, ev.gateway, ev.order.order_number
            );
        })
    });
    hooks.on_order_annulled(|ev| {
        Box::pin(async move {
            info!("🛒️ Order [{}] annulled ({})", ev.order.order_number, ev.status);
        })
    });
    hooks
}
