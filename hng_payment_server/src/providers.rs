//! Concrete PIX provider adapters.
//!
//! The engine's `ChargeApi` drives a `PaymentProvider`; this module supplies the REST implementation. All four
//! gateways expose the same charge primitives over broadly similar JSON APIs, so one adapter parameterised on the
//! gateway config covers them; only the status vocabulary needs normalising per gateway.
use std::time::Duration;

use chrono::{DateTime, Utc};
use hng_payment_engine::{
    db_types::{ChargeStatus, GatewayId, Money},
    traits::{ChargeRequest, PaymentProvider, ProviderCharge, ProviderError},
};
use log::*;
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::Deserialize;

use crate::{config::GatewayConfig, errors::ServerError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A PIX charge client for one gateway's REST API.
#[derive(Clone)]
pub struct RestPixProvider {
    gateway: GatewayId,
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChargeBody {
    id: String,
    #[serde(default)]
    status: Option<String>,
    /// The PIX copy-and-paste BR Code.
    #[serde(default)]
    qr_code: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl RestPixProvider {
    /// Build an adapter from the gateway's configuration. `Ok(None)` when the gateway is disabled or has no API
    /// endpoint configured.
    pub fn from_config(config: &GatewayConfig) -> Result<Option<Self>, ServerError> {
        if !config.enabled || config.api_url.is_empty() {
            return Ok(None);
        }
        let mut headers = HeaderMap::new();
        if let Ok(value) = config.api_key.reveal().parse() {
            headers.insert("X-Api-Key", value);
        }
        let client = Client::builder()
            .user_agent("HNG Payment Server")
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServerError::InitializeError(format!("HTTP client for {}: {e}", config.gateway)))?;
        Ok(Some(Self { gateway: config.gateway, base_url: config.api_url.trim_end_matches('/').to_string(), client }))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Normalize the gateway's status vocabulary. Anything unrecognized is a protocol error rather than a guess.
    fn normalize_status(&self, status: &str) -> Result<ChargeStatus, ProviderError> {
        let normalized = match (self.gateway, status.to_ascii_uppercase().as_str()) {
            (_, "PENDING" | "CREATED" | "ACTIVE" | "AWAITING_PAYMENT") => ChargeStatus::Created,
            (_, "RECEIVED" | "CONFIRMED" | "PAID" | "APPROVED") => ChargeStatus::Paid,
            (_, "OVERDUE" | "EXPIRED" | "CANCELLED") => ChargeStatus::Expired,
            (_, "REFUNDED" | "CHARGEBACK") => ChargeStatus::Refunded,
            (gateway, other) => {
                return Err(ProviderError::Protocol(format!("{gateway} reported unknown charge status {other}")))
            },
        };
        Ok(normalized)
    }
}

impl PaymentProvider for RestPixProvider {
    fn gateway(&self) -> GatewayId {
        self.gateway
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<ProviderCharge, ProviderError> {
        let body = serde_json::json!({
            "external_reference": request.order_number.as_str(),
            "amount": request.amount,
            "customer_email": request.customer_email,
            "customer_name": request.customer_name,
            "expires_in_seconds": request.expires_in.num_seconds(),
        });
        let res = self
            .client
            .post(self.url("charges"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let message = res.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("{status}: {message}")));
        }
        let charge: ChargeBody = res.json().await.map_err(|e| ProviderError::Protocol(e.to_string()))?;
        debug!("🧲️ {} opened charge [{}] for {}", self.gateway, charge.id, request.order_number);
        Ok(ProviderCharge {
            charge_id: charge.id,
            qr_code: charge.qr_code,
            expires_at: charge.expires_at.unwrap_or_else(|| Utc::now() + request.expires_in),
        })
    }

    async fn get_status(&self, charge_id: &str) -> Result<ChargeStatus, ProviderError> {
        let res = self
            .client
            .get(self.url(&format!("charges/{charge_id}")))
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;
        if res.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::UnknownCharge(charge_id.to_string()));
        }
        let charge: ChargeBody = res.json().await.map_err(|e| ProviderError::Protocol(e.to_string()))?;
        let status = charge.status.ok_or_else(|| {
            ProviderError::Protocol(format!("{} returned no status for charge {charge_id}", self.gateway))
        })?;
        self.normalize_status(&status)
    }

    async fn cancel_charge(&self, charge_id: &str) -> Result<(), ProviderError> {
        let res = self
            .client
            .delete(self.url(&format!("charges/{charge_id}")))
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;
        match res.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ProviderError::UnknownCharge(charge_id.to_string())),
            s => Err(ProviderError::Rejected(s.to_string())),
        }
    }

    async fn refund(&self, charge_id: &str, amount: Option<Money>) -> Result<(), ProviderError> {
        let body = match amount {
            Some(amount) => serde_json::json!({ "amount": amount }),
            None => serde_json::json!({}),
        };
        let res = self
            .client
            .post(self.url(&format!("charges/{charge_id}/refund")))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;
        match res.status() {
            s if s.is_success() => {
                info!("🧲️ Charge [{charge_id}] refunded at {}", self.gateway);
                Ok(())
            },
            StatusCode::NOT_FOUND => Err(ProviderError::UnknownCharge(charge_id.to_string())),
            s => Err(ProviderError::Rejected(s.to_string())),
        }
    }

    fn supports_partial_refund(&self) -> bool {
        // Of the four, only MercadoPago's PIX refunds take an amount.
        self.gateway == GatewayId::MercadoPago
    }
}

#[cfg(test)]
mod test {
    use hpg_common::Secret;

    use super::*;

    fn provider(gateway: GatewayId) -> RestPixProvider {
        let config = GatewayConfig {
            gateway,
            enabled: true,
            webhook_secret: Secret::new(String::new()),
            api_url: "https://api.example.com/v1/".into(),
            api_key: Secret::new("key".into()),
            whitelist: None,
        };
        RestPixProvider::from_config(&config).unwrap().unwrap()
    }

    #[test]
    fn disabled_gateway_yields_no_provider() {
        let mut config = GatewayConfig {
            gateway: GatewayId::Asaas,
            enabled: false,
            webhook_secret: Secret::new(String::new()),
            api_url: "https://api.example.com".into(),
            api_key: Secret::new(String::new()),
            whitelist: None,
        };
        assert!(RestPixProvider::from_config(&config).unwrap().is_none());
        config.enabled = true;
        config.api_url = String::new();
        assert!(RestPixProvider::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn status_vocabulary_is_normalized() {
        let provider = provider(GatewayId::Asaas);
        assert_eq!(provider.normalize_status("PENDING").unwrap(), ChargeStatus::Created);
        assert_eq!(provider.normalize_status("received").unwrap(), ChargeStatus::Paid);
        assert_eq!(provider.normalize_status("OVERDUE").unwrap(), ChargeStatus::Expired);
        assert_eq!(provider.normalize_status("REFUNDED").unwrap(), ChargeStatus::Refunded);
        assert!(provider.normalize_status("SOMETHING_ELSE").is_err());
    }

    #[test]
    fn partial_refund_capability() {
        assert!(!provider(GatewayId::Asaas).supports_partial_refund());
        assert!(provider(GatewayId::MercadoPago).supports_partial_refund());
    }
}
