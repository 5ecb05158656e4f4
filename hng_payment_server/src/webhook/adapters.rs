//! Per-gateway webhook adapters.
//!
//! Each adapter maps its provider's event vocabulary onto the engine's normalized [`PaymentEvent`]. Vocabulary the
//! adapter doesn't recognize is not an error: providers add event types all the time, and an unknown one is logged
//! and acknowledged so the provider stops retrying it.
use hng_payment_engine::db_types::{GatewayId, Money, PaymentEvent, PaymentEventKind};
use log::*;
use serde::Deserialize;
use serde_json::Value;

use crate::{errors::WebhookError, orchestrator::OrchestratorClient};

/// The adapter's verdict on a payload.
#[derive(Debug)]
pub enum ParsedWebhook {
    Event(PaymentEvent),
    /// The payload only names a payment; the detail must be fetched before anything can be applied.
    NeedsDetail { payment_id: String },
    Unrecognized(String),
}

/// Extract the provider's event id for replay detection, before any further parsing. `None` when the gateway
/// doesn't number its events (the pipeline then skips the idempotency stage and relies on the transition function).
pub fn extract_event_id(gateway: GatewayId, body: &[u8]) -> Option<String> {
    match gateway {
        GatewayId::Asaas | GatewayId::MercadoPago => {
            let value: Value = serde_json::from_slice(body).ok()?;
            match value.get("id") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }
        },
        GatewayId::PagSeguro => parse_form(body).into_iter().find(|(k, _)| k == "notificationCode").map(|(_, v)| v),
        GatewayId::PicPay => {
            let value: Value = serde_json::from_slice(body).ok()?;
            value.get("authorizationId").and_then(Value::as_str).map(String::from)
        },
    }
}

pub fn parse_event(gateway: GatewayId, body: &[u8]) -> Result<ParsedWebhook, WebhookError> {
    match gateway {
        GatewayId::Asaas => parse_asaas(body),
        GatewayId::MercadoPago => parse_mercado_pago(body),
        GatewayId::PagSeguro => parse_pag_seguro(body),
        GatewayId::PicPay => parse_pic_pay(body),
    }
}

/// Complete a [`ParsedWebhook::NeedsDetail`] by fetching the payment from the orchestrator. A fetch failure here is
/// a 500: the delivery must be retried, because the payload alone says nothing about the outcome.
pub async fn resolve_with_detail(
    gateway: GatewayId,
    payment_id: String,
    event_id: Option<String>,
    orchestrator: &OrchestratorClient,
) -> Result<ParsedWebhook, WebhookError> {
    let detail =
        orchestrator.get_payment(&payment_id).await.map_err(|e| WebhookError::UpstreamLookup(e.to_string()))?;
    let kind = match detail.status.to_ascii_lowercase().as_str() {
        "approved" | "paid" => PaymentEventKind::Paid,
        "cancelled" | "expired" => PaymentEventKind::Overdue,
        "refunded" | "charged_back" => PaymentEventKind::Refunded,
        "pending" | "in_process" => PaymentEventKind::Created,
        other => {
            return Ok(ParsedWebhook::Unrecognized(format!("payment status {other}")));
        },
    };
    let mut event = PaymentEvent::new(gateway, kind);
    event.event_id = event_id;
    event.payment_id = Some(detail.payment_id.clone());
    event.order_ref = detail.order_reference.clone().map(Into::into);
    event.amount = detail.amount;
    event.gateway_fee = detail.gateway_fee;
    event.raw = serde_json::json!({ "payment_id": detail.payment_id, "status": detail.status });
    Ok(ParsedWebhook::Event(event))
}

//-------------------------------------------------  Asaas  ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AsaasWebhook {
    #[serde(default)]
    id: Option<String>,
    event: String,
    #[serde(default)]
    payment: Option<AsaasPayment>,
}

#[derive(Debug, Deserialize)]
struct AsaasPayment {
    id: String,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default, rename = "netValue")]
    net_value: Option<f64>,
    #[serde(default, rename = "externalReference")]
    external_reference: Option<String>,
}

fn parse_asaas(body: &[u8]) -> Result<ParsedWebhook, WebhookError> {
    let raw: Value = serde_json::from_slice(body).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
    let webhook: AsaasWebhook =
        serde_json::from_value(raw.clone()).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
    let kind = match webhook.event.as_str() {
        "PAYMENT_RECEIVED" | "PAYMENT_CONFIRMED" => PaymentEventKind::Paid,
        "PAYMENT_OVERDUE" => PaymentEventKind::Overdue,
        "PAYMENT_REFUNDED" | "PAYMENT_DELETED" => PaymentEventKind::Refunded,
        "PAYMENT_CREATED" => PaymentEventKind::Created,
        other => return Ok(ParsedWebhook::Unrecognized(format!("event {other}"))),
    };
    let payment = webhook
        .payment
        .ok_or_else(|| WebhookError::MalformedPayload(format!("{} carries no payment object", webhook.event)))?;
    let mut event = PaymentEvent::new(GatewayId::Asaas, kind);
    event.event_id = webhook.id;
    event.payment_id = Some(payment.id);
    event.order_ref = payment.external_reference.map(Into::into);
    event.amount = payment.value.and_then(money_from_decimal);
    // Asaas reports the net it will pay out; the difference is its fee.
    event.gateway_fee = match (payment.value, payment.net_value) {
        (Some(gross), Some(net)) if gross >= net => money_from_decimal(gross - net),
        _ => None,
    };
    event.raw = raw;
    Ok(ParsedWebhook::Event(event))
}

//-------------------------------------------------  MercadoPago  ------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MercadoPagoWebhook {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    data: Option<MercadoPagoData>,
}

#[derive(Debug, Deserialize)]
struct MercadoPagoData {
    id: Value,
}

/// MercadoPago notifications only name the payment; the outcome comes from a follow-up detail fetch.
fn parse_mercado_pago(body: &[u8]) -> Result<ParsedWebhook, WebhookError> {
    let webhook: MercadoPagoWebhook =
        serde_json::from_slice(body).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
    let topic = webhook.kind.or(webhook.action).unwrap_or_default();
    if !topic.contains("payment") {
        return Ok(ParsedWebhook::Unrecognized(format!("topic {topic}")));
    }
    let payment_id = match webhook.data.map(|d| d.id) {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(WebhookError::MalformedPayload("payment notification carries no data.id".into())),
    };
    Ok(ParsedWebhook::NeedsDetail { payment_id })
}

//-------------------------------------------------  PagSeguro  --------------------------------------------------------

/// PagSeguro posts form-encoded notifications. Status codes: 1-2 awaiting, 3-4 paid, 6 refunded, 7 cancelled.
fn parse_pag_seguro(body: &[u8]) -> Result<ParsedWebhook, WebhookError> {
    let fields = parse_form(body);
    let get = |name: &str| fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());
    let transaction_id = get("transaction_id")
        .or_else(|| get("notificationCode"))
        .ok_or_else(|| WebhookError::MalformedPayload("notification carries no transaction reference".into()))?;
    let status =
        get("status").ok_or_else(|| WebhookError::MalformedPayload("notification carries no status".into()))?;
    let kind = match status.as_str() {
        "1" | "2" => PaymentEventKind::Created,
        "3" | "4" => PaymentEventKind::Paid,
        "6" => PaymentEventKind::Refunded,
        "7" => PaymentEventKind::Overdue,
        other => return Ok(ParsedWebhook::Unrecognized(format!("status code {other}"))),
    };
    let mut event = PaymentEvent::new(GatewayId::PagSeguro, kind);
    event.event_id = get("notificationCode");
    event.payment_id = Some(transaction_id);
    event.order_ref = get("reference").map(Into::into);
    event.amount = get("amount").and_then(|v| v.parse::<Money>().ok());
    event.raw = Value::Object(fields.into_iter().map(|(k, v)| (k, Value::String(v))).collect());
    Ok(ParsedWebhook::Event(event))
}

//-------------------------------------------------  PicPay  -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PicPayWebhook {
    #[serde(rename = "referenceId")]
    reference_id: String,
    #[serde(default, rename = "authorizationId")]
    authorization_id: Option<String>,
    status: String,
}

fn parse_pic_pay(body: &[u8]) -> Result<ParsedWebhook, WebhookError> {
    let raw: Value = serde_json::from_slice(body).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
    let webhook: PicPayWebhook =
        serde_json::from_value(raw.clone()).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
    let kind = match webhook.status.as_str() {
        "created" | "analysis" => PaymentEventKind::Created,
        "paid" | "completed" => PaymentEventKind::Paid,
        "expired" => PaymentEventKind::Overdue,
        "refunded" | "chargeback" => PaymentEventKind::Refunded,
        other => return Ok(ParsedWebhook::Unrecognized(format!("status {other}"))),
    };
    let mut event = PaymentEvent::new(GatewayId::PicPay, kind);
    event.event_id = webhook.authorization_id.clone();
    event.payment_id = webhook.authorization_id;
    event.order_ref = Some(webhook.reference_id.into());
    event.raw = raw;
    Ok(ParsedWebhook::Event(event))
}

//-------------------------------------------------  Helpers  ----------------------------------------------------------

/// Cents are only trusted while they are exactly representable in an `f64` (2^53), which is far beyond any real
/// charge. Anything outside that, or non-finite, is treated as absent rather than silently saturated.
const MAX_EXACT_CENTS: f64 = 9_007_199_254_740_992.0;

fn money_from_decimal(value: f64) -> Option<Money> {
    let cents = (value * 100.0).round();
    (cents.is_finite() && cents.abs() <= MAX_EXACT_CENTS).then(|| Money::from_cents(cents as i64))
}

/// Minimal `application/x-www-form-urlencoded` parsing, enough for PagSeguro's notification fields.
fn parse_form(body: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(body);
    text.split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((percent_decode(k), percent_decode(v)))
        })
        .collect()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                // Truncated or non-hex escapes pass through as a literal '%'. Decoding stays on the raw bytes so a
                // mangled escape next to a multibyte character cannot split a char.
                let escaped = bytes
                    .get(i + 1..i + 3)
                    .and_then(|pair| std::str::from_utf8(pair).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match escaped {
                    Some(b) => {
                        out.push(b);
                        i += 2;
                    },
                    None => out.push(b'%'),
                }
            },
            b => out.push(b),
        }
        i += 1;
    }
    match String::from_utf8(out) {
        Ok(decoded) => decoded,
        Err(_) => {
            trace!("Form value is not valid UTF-8 after decoding; keeping it raw");
            s.to_string()
        },
    }
}

#[cfg(test)]
mod test {
    use hng_payment_engine::db_types::OrderId;

    use super::*;

    #[test]
    fn asaas_payment_received() {
        let body = serde_json::json!({
            "id": "evt_123",
            "event": "PAYMENT_RECEIVED",
            "payment": {
                "id": "pay_900",
                "value": 110.00,
                "netValue": 108.01,
                "externalReference": "HNG-000001"
            }
        });
        let parsed = parse_event(GatewayId::Asaas, body.to_string().as_bytes()).unwrap();
        let ParsedWebhook::Event(event) = parsed else { panic!("expected an event") };
        assert_eq!(event.kind, PaymentEventKind::Paid);
        assert_eq!(event.event_id.as_deref(), Some("evt_123"));
        assert_eq!(event.payment_id.as_deref(), Some("pay_900"));
        assert_eq!(event.order_ref, Some(OrderId("HNG-000001".into())));
        assert_eq!(event.amount, Some(Money::from_units(110)));
        assert_eq!(event.gateway_fee, Some(Money::from_cents(199)));
    }

    #[test]
    fn asaas_unknown_event_is_acknowledged_not_failed() {
        let body = br#"{"id":"evt_9","event":"PAYMENT_ANTICIPATED","payment":{"id":"pay_1"}}"#;
        assert!(matches!(parse_event(GatewayId::Asaas, body).unwrap(), ParsedWebhook::Unrecognized(_)));
    }

    #[test]
    fn asaas_garbage_is_malformed() {
        assert!(matches!(
            parse_event(GatewayId::Asaas, b"not json at all"),
            Err(WebhookError::MalformedPayload(_))
        ));
    }

    #[test]
    fn mercado_pago_needs_a_detail_fetch() {
        let body = br#"{"id": 5577, "type": "payment", "data": {"id": "88123"}}"#;
        let parsed = parse_event(GatewayId::MercadoPago, body).unwrap();
        assert!(matches!(parsed, ParsedWebhook::NeedsDetail { ref payment_id } if payment_id == "88123"));
        assert_eq!(extract_event_id(GatewayId::MercadoPago, body).as_deref(), Some("5577"));
    }

    #[test]
    fn mercado_pago_non_payment_topic_is_ignored() {
        let body = br#"{"id": 1, "type": "plan", "data": {"id": "2"}}"#;
        assert!(matches!(parse_event(GatewayId::MercadoPago, body).unwrap(), ParsedWebhook::Unrecognized(_)));
    }

    #[test]
    fn pag_seguro_form_notification() {
        let body = b"notificationCode=ABCD-1234&transaction_id=tx_77&status=3&reference=HNG-000002&amount=55.90";
        let parsed = parse_event(GatewayId::PagSeguro, body).unwrap();
        let ParsedWebhook::Event(event) = parsed else { panic!("expected an event") };
        assert_eq!(event.kind, PaymentEventKind::Paid);
        assert_eq!(event.payment_id.as_deref(), Some("tx_77"));
        assert_eq!(event.order_ref, Some(OrderId("HNG-000002".into())));
        assert_eq!(event.amount, Some(Money::from_cents(5_590)));
        assert_eq!(extract_event_id(GatewayId::PagSeguro, body).as_deref(), Some("ABCD-1234"));
    }

    #[test]
    fn pic_pay_expiry() {
        let body = br#"{"referenceId": "HNG-000003", "authorizationId": "auth_5", "status": "expired"}"#;
        let parsed = parse_event(GatewayId::PicPay, body).unwrap();
        let ParsedWebhook::Event(event) = parsed else { panic!("expected an event") };
        assert_eq!(event.kind, PaymentEventKind::Overdue);
        assert_eq!(event.payment_id.as_deref(), Some("auth_5"));
    }

    #[test]
    fn decimal_amounts_convert_exactly_or_not_at_all() {
        assert_eq!(money_from_decimal(110.00), Some(Money::from_units(110)));
        assert_eq!(money_from_decimal(1.99), Some(Money::from_cents(199)));
        assert_eq!(money_from_decimal(f64::NAN), None);
        assert_eq!(money_from_decimal(f64::INFINITY), None);
        assert_eq!(money_from_decimal(1.0e18), None);
    }

    #[test]
    fn form_decoding() {
        let fields = parse_form(b"a=1+2&b=caf%C3%A9&c=%2Fpath");
        assert_eq!(fields[0], ("a".into(), "1 2".into()));
        assert_eq!(fields[1], ("b".into(), "café".into()));
        assert_eq!(fields[2], ("c".into(), "/path".into()));
    }

    #[test]
    fn form_decoding_tolerates_mangled_escapes() {
        // A broken escape followed by a multibyte character decodes to the literal bytes, without panicking.
        assert_eq!(extract_event_id(GatewayId::PagSeguro, "notificationCode=%aé".as_bytes()).as_deref(), Some("%aé"));
        let fields = parse_form(b"x=%2&y=%zz&z=100%");
        assert_eq!(fields[0], ("x".into(), "%2".into()));
        assert_eq!(fields[1], ("y".into(), "%zz".into()));
        assert_eq!(fields[2], ("z".into(), "100%".into()));
    }
}
