//! Webhook ingestion.
//!
//! Every gateway delivery runs the same staged pipeline, and the order of the stages is deliberate:
//!
//! 1. Delegation. When another deployment owns webhook processing, answer 410 so providers drop this endpoint.
//! 2. Source check. The caller's address must be on the gateway's CIDR whitelist (403).
//! 3. Rate limit. A per-gateway fixed window caps retry storms (429).
//! 4. Idempotency. The provider's event id is checked against a short-TTL memory cache and then durably marked in
//!    the database. Replays answer 200 so the provider stops resending. The durable marker is written before the
//!    signature is checked: a replayed delivery must be recognized even when a proxy mangled its signature header.
//! 5. Authentication. HMAC-SHA256 over the raw body against the gateway's webhook secret (401/403).
//! 6. Adapter dispatch. The gateway adapter maps the payload onto a normalized payment event (400/404/500).
//! 7. Application. The event goes through the engine's transition function, which settles, refunds or holds the
//!    order as appropriate.
pub mod adapters;

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use actix_web::{web, HttpRequest, HttpResponse};
use hng_payment_engine::{
    db_types::GatewayId,
    helpers::verify_hmac_sha256,
    order_flow::{OrderFlowApi, SettlementOutcome},
    traits::SettlementBackend,
    FeeApi,
    OrderFlowError,
};
use log::*;

use crate::{
    config::ServerConfig,
    data_objects::JsonResponse,
    errors::{ServerError, WebhookError},
    helpers::{get_remote_ip, ip_whitelisted},
    orchestrator::{OrchestratorClient, OrchestratorTierSource},
    rate_limiter::RateLimiter,
};

pub const SIGNATURE_HEADER: &str = "X-Hng-Signature";
pub const EVENT_ID_HEADER: &str = "X-Event-Id";
/// How long an event id stays in the in-memory replay cache. Durable markers outlive this by weeks; the cache only
/// exists to absorb rapid-fire retries without a database round trip.
const RECENT_EVENT_TTL: Duration = Duration::from_secs(300);

/// Everything the webhook pipeline needs that isn't an engine API.
pub struct WebhookState {
    pub delegate: bool,
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
    pub config: ServerConfig,
    pub limiter: RateLimiter,
    recent: RecentEventCache,
}

impl WebhookState {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            delegate: config.delegate_webhooks,
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
            config: config.clone(),
            limiter: RateLimiter::per_minute(config.webhook_rate_limit),
            recent: RecentEventCache::new(RECENT_EVENT_TTL),
        }
    }
}

/// A short-TTL cache of recently seen event ids, one step in front of the durable markers.
struct RecentEventCache {
    ttl: Duration,
    seen: Mutex<HashMap<(GatewayId, String), Instant>>,
}

impl RecentEventCache {
    fn new(ttl: Duration) -> Self {
        Self { ttl, seen: Mutex::new(HashMap::new()) }
    }

    /// Record `event_id` and report whether it was already present (and fresh).
    fn check_and_record(&self, gateway: GatewayId, event_id: &str) -> bool {
        let mut seen = self.seen.lock().expect("recent event cache lock poisoned");
        let now = Instant::now();
        seen.retain(|_, at| now.duration_since(*at) < self.ttl);
        seen.insert((gateway, event_id.to_string()), now).is_some()
    }
}

/// POST `/webhook/{gateway}`. The handler body for every gateway; the adapter does the per-gateway work.
pub async fn handle_webhook<B>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    state: web::Data<WebhookState>,
    orders: web::Data<OrderFlowApi<B>>,
    fees: web::Data<FeeApi<B, OrchestratorTierSource>>,
    orchestrator: web::Data<OrchestratorClient>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementBackend,
{
    let gateway_name = path.into_inner();
    let gateway =
        gateway_name.parse::<GatewayId>().map_err(|_| WebhookError::UnknownGateway(gateway_name.clone()))?;
    // Stage 1: delegation.
    if state.delegate {
        debug!("📨️ Dropping {gateway} webhook: processing is delegated");
        return Err(WebhookError::Delegated.into());
    }
    let gw_config = state.config.gateways.get(gateway);
    // Stage 2: source whitelist. `None` means the operator explicitly disabled the check.
    if let Some(whitelist) = &gw_config.whitelist {
        let ip = get_remote_ip(&req, state.use_x_forwarded_for, state.use_forwarded)
            .ok_or(WebhookError::ForbiddenPeer)?;
        if !ip_whitelisted(ip, whitelist) {
            warn!("📨️ {gateway} webhook from non-whitelisted address {ip} rejected");
            return Err(WebhookError::ForbiddenPeer.into());
        }
    }
    // Stage 3: rate limit.
    if !state.limiter.check(gateway) {
        return Err(WebhookError::RateLimited.into());
    }
    // Stage 4: idempotency. Header wins; otherwise the adapter digs the id out of the payload.
    let event_id = req
        .headers()
        .get(EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .or_else(|| adapters::extract_event_id(gateway, &body));
    if let Some(id) = &event_id {
        if state.recent.check_and_record(gateway, id) {
            debug!("📨️ {gateway} event [{id}] replayed within the cache window; acknowledged");
            return Ok(HttpResponse::Ok().json(JsonResponse::success("Event already processed")));
        }
        let fresh = orders.try_mark_event(gateway, id).await?;
        if !fresh {
            debug!("📨️ {gateway} event [{id}] already marked; acknowledged");
            return Ok(HttpResponse::Ok().json(JsonResponse::success("Event already processed")));
        }
    }
    // Stage 5: authenticate the body.
    verify_webhook_signature(&req, &body, gw_config.webhook_secret.reveal())?;
    // Stage 6: adapter dispatch.
    let parsed = adapters::parse_event(gateway, &body)?;
    let event = match parsed {
        adapters::ParsedWebhook::Event(event) => event,
        adapters::ParsedWebhook::NeedsDetail { payment_id } => {
            match adapters::resolve_with_detail(gateway, payment_id, event_id, orchestrator.get_ref()).await? {
                adapters::ParsedWebhook::Event(event) => event,
                adapters::ParsedWebhook::Unrecognized(what) => {
                    info!("📨️ {gateway} webhook ignored after detail fetch ({what})");
                    return Ok(HttpResponse::Ok().json(JsonResponse::success("Event acknowledged but not actionable")));
                },
                adapters::ParsedWebhook::NeedsDetail { .. } => {
                    return Err(WebhookError::MalformedPayload("detail fetch did not resolve the event".into()).into())
                },
            }
        },
        adapters::ParsedWebhook::Unrecognized(what) => {
            info!("📨️ {gateway} webhook ignored ({what})");
            return Ok(HttpResponse::Ok().json(JsonResponse::success("Event acknowledged but not actionable")));
        },
    };
    // Stage 7: apply. A fee reported by the gateway counts as remote validation; without one the local table
    // computed the fee, so the transaction is flagged as a fallback.
    let is_fallback = event.gateway_fee.is_none();
    let calculator = fees.calculator().await;
    let outcome = match orders.apply_payment_event(event, &calculator, is_fallback).await {
        Ok(outcome) => outcome,
        Err(OrderFlowError::OrderNotFound(hint)) => return Err(WebhookError::OrderNotResolved(hint).into()),
        Err(e) => return Err(e.into()),
    };
    let message = match outcome {
        SettlementOutcome::Applied { order, .. } => {
            info!("📨️ {gateway} webhook applied; order [{}] is now {}", order.order_number, order.status);
            format!("Order {} updated", order.order_number)
        },
        SettlementOutcome::AlreadyApplied(order) => format!("Order {} already up to date", order.order_number),
        SettlementOutcome::Ignored => "Event acknowledged but not actionable".into(),
    };
    Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
}

/// Stage 5 in one place. The signature header is `X-Hng-Signature: sha256=<hex>` over the raw body.
fn verify_webhook_signature(req: &HttpRequest, body: &[u8], secret: &str) -> Result<(), WebhookError> {
    if secret.is_empty() {
        return Err(WebhookError::MissingSecret);
    }
    let header = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;
    let signature = header.strip_prefix("sha256=").ok_or(WebhookError::MissingSignature)?;
    verify_hmac_sha256(secret, body, signature).map_err(|_| WebhookError::InvalidSignature)
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;
    use hng_payment_engine::helpers::hmac_sha256_hex;

    use super::*;

    #[test]
    fn recent_cache_reports_replays() {
        let cache = RecentEventCache::new(Duration::from_secs(60));
        assert!(!cache.check_and_record(GatewayId::Asaas, "evt_1"));
        assert!(cache.check_and_record(GatewayId::Asaas, "evt_1"));
        // Different gateway, same id: distinct entries.
        assert!(!cache.check_and_record(GatewayId::PicPay, "evt_1"));
    }

    #[test]
    fn recent_cache_expires_entries() {
        let cache = RecentEventCache::new(Duration::from_millis(5));
        assert!(!cache.check_and_record(GatewayId::Asaas, "evt_2"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(!cache.check_and_record(GatewayId::Asaas, "evt_2"));
    }

    #[test]
    fn signature_verification() {
        let body = br#"{"id":"evt"}"#;
        let signature = hmac_sha256_hex("hook-secret", body);
        let req = TestRequest::post()
            .insert_header((SIGNATURE_HEADER, format!("sha256={signature}")))
            .to_http_request();
        verify_webhook_signature(&req, body, "hook-secret").unwrap();
        assert!(matches!(
            verify_webhook_signature(&req, body, "other-secret"),
            Err(WebhookError::InvalidSignature)
        ));
        assert!(matches!(verify_webhook_signature(&req, body, ""), Err(WebhookError::MissingSecret)));
        let unsigned = TestRequest::post().to_http_request();
        assert!(matches!(
            verify_webhook_signature(&unsigned, body, "hook-secret"),
            Err(WebhookError::MissingSignature)
        ));
    }
}
