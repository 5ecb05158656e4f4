//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause
//! the current worker to stop processing new requests. Any long, non-cpu-bound operation (I/O, database, provider
//! calls) must be expressed as futures so worker threads can interleave other requests.
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use hng_payment_engine::{
    db_types::{Order, OrderStatus, PaymentMethod},
    order_flow::{CheckoutRequest, SettlementOutcome},
    traits::{PaymentProvider, SettlementBackend},
    ChargeApi,
    FeeApi,
    OrderFlowApi,
};
use log::*;

use crate::{
    config::ServerConfig,
    data_objects::{
        ChargeResponse,
        CheckoutPayload,
        CheckoutResponse,
        IntentRequest,
        JsonResponse,
        OrderDetail,
        OrderKeyQuery,
        PollResponse,
        SessionTokenResponse,
    },
    errors::ServerError,
    helpers::get_remote_ip,
    orchestrator::{CheckoutIntent, OrchestratorClient, OrchestratorTierSource, PaymentData},
    session::{issue_session_token, verify_session_token},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Sessions  ----------------------------------------------------

/// Issue the token the checkout form must post back. Called when the checkout page loads.
#[get("/checkout/session")]
pub async fn checkout_session(config: web::Data<ServerConfig>) -> impl Responder {
    let session_token = issue_session_token(config.session_secret.reveal());
    HttpResponse::Ok().json(SessionTokenResponse { session_token })
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(shop_checkout => Post "/checkout" impl SettlementBackend);
/// Route handler for the checkout endpoint.
///
/// Validates the session token and the form, resolves the gateway for the chosen payment method, creates the order
/// atomically, and (for methods settled synchronously through the orchestrator) creates the payment. A PIX order
/// comes back `pending`; the payment page then opens a charge against it.
///
/// When the orchestrator cannot be reached the order still goes through on locally computed fees; only fatal
/// refusals (suspended merchant, forged response) abort the checkout.
pub async fn shop_checkout<B: SettlementBackend>(
    req: HttpRequest,
    body: web::Json<CheckoutPayload>,
    orders: web::Data<OrderFlowApi<B>>,
    fees: web::Data<FeeApi<B, OrchestratorTierSource>>,
    orchestrator: web::Data<OrchestratorClient>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let payload = body.into_inner();
    verify_session_token(config.session_secret.reveal(), &payload.session_token)?;
    if !payload.terms {
        return Err(ServerError::InvalidCheckout("The terms and conditions must be accepted.".into()));
    }
    let gateway = config
        .gateways
        .gateway_for(payload.payment_method)
        .ok_or_else(|| ServerError::InvalidCheckout(format!("invalid_payment: {}", payload.payment_method)))?;
    let rate_bps = fees.current_rate_bps(payload.product_type).await?;
    let client_ip = get_remote_ip(&req, config.use_x_forwarded_for, config.use_forwarded).map(|ip| ip.to_string());
    let user_agent =
        req.headers().get("User-Agent").and_then(|v| v.to_str().ok()).map(String::from);
    let request = CheckoutRequest {
        customer_id: payload.customer_id.clone(),
        product_type: payload.product_type,
        payment_method: payload.payment_method,
        billing: payload.billing.clone(),
        items: payload.items_with_commission(rate_bps),
        shipping_total: payload.shipping_total,
        discount_total: payload.discount_total,
        client_ip,
        user_agent,
    };
    let outcome = orders.create_from_cart(request).await?;
    let mut order = outcome.order;
    let mut payment_id = None;
    // PIX settles asynchronously through the charge state machine; everything else goes through the orchestrator
    // right here.
    if payload.payment_method != PaymentMethod::Pix {
        let payment = PaymentData {
            order_number: order.order_number.clone(),
            amount: order.total,
            method: payload.payment_method,
            customer_email: order.billing.billing_email.clone(),
        };
        match orchestrator.create_payment_with_validation(gateway, &payment).await {
            Ok(result) => {
                order = orders.set_payment_reference(order.id, gateway, &result.payment_id).await?;
                payment_id = Some(result.payment_id);
            },
            Err(e) if e.is_fatal() => {
                error!("💳️ Payment for order [{}] refused: {e}", order.order_number);
                let note = format!("Payment creation refused: {e}");
                orders.transition_order(order.id, OrderStatus::Failed, Some(note)).await?;
                return Err(e.into());
            },
            Err(e) => {
                warn!(
                    "💳️ Orchestrator unavailable for order [{}] ({e}); continuing on local fees",
                    order.order_number
                );
            },
        }
    }
    let key = order.order_number.as_str().to_string();
    let redirect_to = match payload.payment_method {
        PaymentMethod::Pix => format!("/order/{}/charge?key={key}", order.id),
        _ => format!("/order/{}?key={key}", order.id),
    };
    let response = CheckoutResponse {
        order_id: order.id,
        key,
        payment_method: payload.payment_method,
        status: order.status,
        total: order.total,
        payment_id,
        redirect_to,
    };
    Ok(HttpResponse::Ok().json(response))
}

//----------------------------------------------   Checkout intents  --------------------------------------------

/// Issue a signed, single-use checkout intent for an embedded checkout page.
#[post("/checkout/intent")]
pub async fn create_checkout_intent(
    body: web::Json<IntentRequest>,
    orchestrator: web::Data<OrchestratorClient>,
) -> Result<HttpResponse, ServerError> {
    let intent = orchestrator.create_checkout_intent(&body.audience).await?;
    Ok(HttpResponse::Ok().json(intent))
}

/// Redemption check for a checkout intent the client hands back.
#[post("/checkout/intent/verify")]
pub async fn verify_checkout_intent(
    body: web::Json<CheckoutIntent>,
    orchestrator: web::Data<OrchestratorClient>,
) -> Result<HttpResponse, ServerError> {
    orchestrator.verify_checkout_intent(&body)?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Intent is valid")))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_detail => Get "/order/{id}" impl SettlementBackend);
/// The confirmation-page view of an order. The order number doubles as the access key; without it the order's
/// existence is not even confirmed.
pub async fn order_detail<B: SettlementBackend>(
    path: web::Path<i64>,
    query: web::Query<OrderKeyQuery>,
    orders: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let order = fetch_guarded_order(order_id, &query.key, orders.as_ref()).await?;
    let items = orders.fetch_order_items(order_id).await?;
    Ok(HttpResponse::Ok().json(OrderDetail { order, items }))
}

async fn fetch_guarded_order<B: SettlementBackend>(
    order_id: i64,
    key: &str,
    orders: &OrderFlowApi<B>,
) -> Result<Order, ServerError> {
    let order = orders
        .fetch_order(order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("order {order_id}")))?;
    if order.order_number.as_str() != key {
        debug!("💻️ Access key mismatch for order [{}]", order.order_number);
        return Err(ServerError::NoRecordFound(format!("order {order_id}")));
    }
    Ok(order)
}

//----------------------------------------------   Charges  ----------------------------------------------------
route!(create_charge => Post "/order/{id}/charge" impl SettlementBackend, PaymentProvider);
/// Open (or return the live) PIX charge for the order. 400 when no PIX-capable gateway is enabled.
pub async fn create_charge<B, P>(
    path: web::Path<i64>,
    query: web::Query<OrderKeyQuery>,
    orders: web::Data<OrderFlowApi<B>>,
    charges: web::Data<Option<ChargeApi<B, P>>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementBackend,
    P: PaymentProvider,
{
    let api = charges.as_ref().as_ref().ok_or(ServerError::PixUnavailable)?;
    let order_id = path.into_inner();
    fetch_guarded_order(order_id, &query.key, orders.as_ref()).await?;
    let charge = api.init_charge(order_id).await?;
    Ok(HttpResponse::Ok().json(ChargeResponse::from(charge)))
}

route!(poll_charge => Get "/order/{id}/charge" impl SettlementBackend, PaymentProvider);
/// Short-poll the charge. When the provider reports a state change the resulting event goes through the same
/// transition function the webhook path uses, so whichever of the two arrives first settles the order.
pub async fn poll_charge<B, P>(
    path: web::Path<i64>,
    query: web::Query<OrderKeyQuery>,
    orders: web::Data<OrderFlowApi<B>>,
    charges: web::Data<Option<ChargeApi<B, P>>>,
    fees: web::Data<FeeApi<B, OrchestratorTierSource>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementBackend,
    P: PaymentProvider,
{
    let api = charges.as_ref().as_ref().ok_or(ServerError::PixUnavailable)?;
    let order_id = path.into_inner();
    let order = fetch_guarded_order(order_id, &query.key, orders.as_ref()).await?;
    let poll = api.poll(order_id).await?;
    let order_status = match poll.event {
        Some(event) => {
            let is_fallback = event.gateway_fee.is_none();
            let calculator = fees.calculator().await;
            match orders.apply_payment_event(event, &calculator, is_fallback).await? {
                SettlementOutcome::Applied { order, .. } | SettlementOutcome::AlreadyApplied(order) => order.status,
                SettlementOutcome::Ignored => order.status,
            }
        },
        None => order.status,
    };
    Ok(HttpResponse::Ok().json(PollResponse { status: poll.status, order_status, expires_at: poll.expires_at }))
}

route!(regenerate_charge => Post "/order/{id}/charge/regenerate" impl SettlementBackend, PaymentProvider);
/// Replace an expired charge with a fresh one. 400 while the old charge is still live.
pub async fn regenerate_charge<B, P>(
    path: web::Path<i64>,
    query: web::Query<OrderKeyQuery>,
    orders: web::Data<OrderFlowApi<B>>,
    charges: web::Data<Option<ChargeApi<B, P>>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementBackend,
    P: PaymentProvider,
{
    let api = charges.as_ref().as_ref().ok_or(ServerError::PixUnavailable)?;
    let order_id = path.into_inner();
    fetch_guarded_order(order_id, &query.key, orders.as_ref()).await?;
    let charge = api.regenerate(order_id).await?;
    Ok(HttpResponse::Ok().json(ChargeResponse::from(charge)))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(incoming_webhook => Post "/webhook/{gateway}" impl SettlementBackend);
pub use crate::webhook::handle_webhook as incoming_webhook;
