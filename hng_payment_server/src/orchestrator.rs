//! Client for the remote payment orchestration service.
//!
//! The orchestrator is the authority on fees. The two-step protocol keeps it that way: `validate_transaction` has
//! the service compute the expected fee and hand back a short-lived token, `create_payment` submits the charge
//! bearing that token, and both responses carry a `signed` block the client verifies before trusting anything in
//! them. When the service is unreachable the caller falls back to the local fee table and the resulting
//! transactions are flagged `is_fallback`; a bad signature is never degraded to a fallback.
use std::time::Duration;

use chrono::Utc;
use hng_payment_engine::{
    db_types::{GatewayId, Money, OrderId, PaymentMethod},
    fees::{FeeError, FeeSchedule, FeeTier, TierSource},
    helpers::verify_hmac_sha256,
};
use log::*;
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::OrchestratorConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("Could not build the orchestrator HTTP client. {0}")]
    Initialize(String),
    #[error("The orchestrator is not configured.")]
    NotConfigured,
    #[error("Could not reach the orchestrator. {0}")]
    Unreachable(String),
    #[error("This merchant account is suspended.")]
    MerchantBanned,
    #[error("The orchestrator rejected the request. {0}")]
    Rejected(String),
    #[error("The orchestrator response signature is invalid.")]
    InvalidSignature,
    #[error("Could not parse the orchestrator response. {0}")]
    MalformedResponse(String),
    #[error("The checkout intent is invalid. {0}")]
    InvalidIntent(String),
}

impl OrchestratorError {
    /// Fatal errors must surface to checkout; everything else may fall back to local fee computation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MerchantBanned | Self::InvalidSignature)
    }
}

//-------------------------------------------------  Wire types  -------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignedBlock {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    signed: Option<SignedBlock>,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    payment_id: Option<String>,
    /// The fee the orchestrator charged, in cents. Authoritative when present.
    #[serde(default)]
    gateway_fee: Option<Money>,
    #[serde(default)]
    signed: Option<SignedBlock>,
}

/// The opaque validation token from step 1, good for one `create_payment` call.
#[derive(Debug, Clone)]
pub struct AuthToken(pub String);

/// What step 2 needs to create the actual charge.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentData {
    pub order_number: OrderId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub customer_email: String,
}

#[derive(Debug, Clone)]
pub struct PaymentResult {
    pub payment_id: String,
    /// Present when the orchestrator reports the gateway fee it settled on.
    pub gateway_fee: Option<Money>,
}

/// A signed, single-use token for a client-facing checkout page. Issued by the orchestrator, redeemed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutIntent {
    pub audience: String,
    pub auth_token: String,
    pub unique_id: String,
    /// Unix timestamp after which the intent is dead.
    pub expires_at: i64,
    pub signature: String,
}

/// The orchestrator's view of a payment, for gateways whose webhooks require a follow-up detail fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentDetail {
    pub payment_id: String,
    pub status: String,
    #[serde(default)]
    pub order_reference: Option<String>,
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub gateway_fee: Option<Money>,
}

//-------------------------------------------------  Client  -----------------------------------------------------------

#[derive(Clone)]
pub struct OrchestratorClient {
    client: Client,
    config: OrchestratorConfig,
}

impl OrchestratorClient {
    pub fn new(config: OrchestratorConfig) -> Result<Self, OrchestratorError> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = config.api_key.reveal().parse() {
            headers.insert("X-Api-Key", value);
        }
        let client = Client::builder()
            .user_agent("HNG Payment Server")
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OrchestratorError::Initialize(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Step 1: have the orchestrator validate the transaction and compute the authoritative fee.
    ///
    /// The returned token is only trusted after the `signed` block checks out against `{amount, merchant_id}`.
    pub async fn validate_transaction(
        &self,
        amount: Money,
        gateway: GatewayId,
        method: PaymentMethod,
    ) -> Result<AuthToken, OrchestratorError> {
        if !self.is_configured() {
            return Err(OrchestratorError::NotConfigured);
        }
        let body = serde_json::json!({
            "amount": amount,
            "merchant_id": self.config.merchant_id,
            "gateway": gateway,
            "method": method,
        });
        let res = self
            .client
            .post(self.url("endpoints/transactions-validate.php"))
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestratorError::Unreachable(e.to_string()))?;
        let response: ValidateResponse =
            res.json().await.map_err(|e| OrchestratorError::MalformedResponse(e.to_string()))?;
        match response.status.as_str() {
            "ok" => {},
            "banned" => return Err(OrchestratorError::MerchantBanned),
            other => {
                return Err(OrchestratorError::Rejected(
                    response.message.unwrap_or_else(|| format!("status {other}")),
                ))
            },
        }
        let token = response
            .auth_token
            .ok_or_else(|| OrchestratorError::MalformedResponse("validation response carries no token".into()))?;
        let canonical = format!("{}|{}", amount.value(), self.config.merchant_id);
        self.verify_signed(&canonical, response.signed.as_ref())?;
        debug!("💳️ Transaction of {amount} validated by the orchestrator");
        Ok(AuthToken(token))
    }

    /// Step 2: create the payment, bearing the token from step 1.
    pub async fn create_payment(
        &self,
        token: &AuthToken,
        gateway: GatewayId,
        payment: &PaymentData,
    ) -> Result<PaymentResult, OrchestratorError> {
        if !self.is_configured() {
            return Err(OrchestratorError::NotConfigured);
        }
        let body = serde_json::json!({
            "auth_token": token.0,
            "gateway": gateway,
            "payment": payment,
        });
        let res = self
            .client
            .post(self.url("endpoints/payments-create.php"))
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestratorError::Unreachable(e.to_string()))?;
        let response: CreatePaymentResponse =
            res.json().await.map_err(|e| OrchestratorError::MalformedResponse(e.to_string()))?;
        if response.status != "ok" {
            return Err(OrchestratorError::Rejected(
                response.message.unwrap_or_else(|| format!("status {}", response.status)),
            ));
        }
        let payment_id = response
            .payment_id
            .ok_or_else(|| OrchestratorError::MalformedResponse("payment response carries no payment id".into()))?;
        let canonical = format!("{}|{}|{payment_id}", gateway, payment.amount.value());
        self.verify_signed(&canonical, response.signed.as_ref())?;
        info!("💳️ Payment [{payment_id}] created via {gateway} for {}", payment.amount);
        Ok(PaymentResult { payment_id, gateway_fee: response.gateway_fee })
    }

    /// Steps 1 and 2 composed.
    pub async fn create_payment_with_validation(
        &self,
        gateway: GatewayId,
        payment: &PaymentData,
    ) -> Result<PaymentResult, OrchestratorError> {
        let token = self.validate_transaction(payment.amount, gateway, payment.method).await?;
        self.create_payment(&token, gateway, payment).await
    }

    /// Issue a signed, single-use checkout intent bound to `audience`.
    pub async fn create_checkout_intent(&self, audience: &str) -> Result<CheckoutIntent, OrchestratorError> {
        if !self.is_configured() {
            return Err(OrchestratorError::NotConfigured);
        }
        let body = serde_json::json!({ "audience": audience, "merchant_id": self.config.merchant_id });
        let res = self
            .client
            .post(self.url("endpoints/checkout-intents-create.php"))
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestratorError::Unreachable(e.to_string()))?;
        let intent: CheckoutIntent =
            res.json().await.map_err(|e| OrchestratorError::MalformedResponse(e.to_string()))?;
        self.verify_checkout_intent(&intent)?;
        Ok(intent)
    }

    /// Redemption check for a checkout intent: every field present, not expired, signature valid.
    pub fn verify_checkout_intent(&self, intent: &CheckoutIntent) -> Result<(), OrchestratorError> {
        if intent.audience.is_empty() || intent.auth_token.is_empty() || intent.unique_id.is_empty() {
            return Err(OrchestratorError::InvalidIntent("a required field is empty".into()));
        }
        if intent.expires_at <= Utc::now().timestamp() {
            return Err(OrchestratorError::InvalidIntent("the intent has expired".into()));
        }
        let canonical =
            format!("{}|{}|{}|{}", intent.audience, intent.auth_token, intent.unique_id, intent.expires_at);
        verify_hmac_sha256(self.config.signing_secret.reveal(), canonical.as_bytes(), &intent.signature)
            .map_err(|_| OrchestratorError::InvalidSignature)
    }

    /// Fetch payment details, for gateways whose webhook payloads only carry a payment id.
    pub async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetail, OrchestratorError> {
        if !self.is_configured() {
            return Err(OrchestratorError::NotConfigured);
        }
        let res = self
            .client
            .get(self.url("endpoints/payments-get.php"))
            .query(&[("payment_id", payment_id)])
            .send()
            .await
            .map_err(|e| OrchestratorError::Unreachable(e.to_string()))?;
        if res.status() == StatusCode::NOT_FOUND {
            return Err(OrchestratorError::Rejected(format!("No payment with id {payment_id}")));
        }
        res.json().await.map_err(|e| OrchestratorError::MalformedResponse(e.to_string()))
    }

    fn verify_signed(&self, canonical: &str, signed: Option<&SignedBlock>) -> Result<(), OrchestratorError> {
        let signed = signed.ok_or(OrchestratorError::InvalidSignature)?;
        verify_hmac_sha256(self.config.signing_secret.reveal(), canonical.as_bytes(), &signed.signature).map_err(
            |e| {
                warn!("💳️ Orchestrator response failed signature verification: {e}");
                OrchestratorError::InvalidSignature
            },
        )
    }
}

//-----------------------------------------------  Tier overrides  -----------------------------------------------------

/// Fetches fee-tier overrides from the orchestrator. Plugged into the engine's `CachedTierSource`, which keeps the
/// last-good schedule whenever this fails.
#[derive(Clone)]
pub struct OrchestratorTierSource {
    client: OrchestratorClient,
}

#[derive(Debug, Deserialize)]
struct TierResponse {
    tiers: Vec<FeeTier>,
}

impl OrchestratorTierSource {
    pub fn new(client: OrchestratorClient) -> Self {
        Self { client }
    }
}

impl TierSource for OrchestratorTierSource {
    async fn fetch_schedule(&self) -> Result<FeeSchedule, FeeError> {
        if !self.client.is_configured() {
            return Err(FeeError::RemoteFetch("orchestrator is not configured".into()));
        }
        let res = self
            .client
            .client
            .get(self.client.url("endpoints/fee-tiers-get.php"))
            .send()
            .await
            .map_err(|e| FeeError::RemoteFetch(e.to_string()))?;
        let response: TierResponse = res.json().await.map_err(|e| FeeError::RemoteFetch(e.to_string()))?;
        FeeSchedule::new(response.tiers)
    }
}

#[cfg(test)]
mod test {
    use hng_payment_engine::helpers::hmac_sha256_hex;
    use hpg_common::Secret;

    use super::*;

    fn client(secret: &str) -> OrchestratorClient {
        let config = OrchestratorConfig {
            base_url: "https://orchestrator.example.com".into(),
            api_key: Secret::new("key".into()),
            signing_secret: Secret::new(secret.into()),
            merchant_id: "merch_042".into(),
        };
        OrchestratorClient::new(config).unwrap()
    }

    fn intent(secret: &str, expires_at: i64) -> CheckoutIntent {
        let canonical = format!("checkout-page|tok_1|uid_1|{expires_at}");
        CheckoutIntent {
            audience: "checkout-page".into(),
            auth_token: "tok_1".into(),
            unique_id: "uid_1".into(),
            expires_at,
            signature: hmac_sha256_hex(secret, canonical.as_bytes()),
        }
    }

    #[test]
    fn valid_intent_passes() {
        let client = client("s3kr1t");
        let intent = intent("s3kr1t", Utc::now().timestamp() + 300);
        client.verify_checkout_intent(&intent).unwrap();
    }

    #[test]
    fn expired_intent_is_rejected() {
        let client = client("s3kr1t");
        let intent = intent("s3kr1t", Utc::now().timestamp() - 1);
        assert!(matches!(client.verify_checkout_intent(&intent), Err(OrchestratorError::InvalidIntent(_))));
    }

    #[test]
    fn tampered_intent_is_rejected() {
        let client = client("s3kr1t");
        let mut intent = intent("s3kr1t", Utc::now().timestamp() + 300);
        intent.audience = "somewhere-else".into();
        assert!(matches!(client.verify_checkout_intent(&intent), Err(OrchestratorError::InvalidSignature)));
    }

    #[test]
    fn intent_with_missing_fields_is_rejected() {
        let client = client("s3kr1t");
        let mut intent = intent("s3kr1t", Utc::now().timestamp() + 300);
        intent.unique_id = String::new();
        assert!(matches!(client.verify_checkout_intent(&intent), Err(OrchestratorError::InvalidIntent(_))));
    }

    #[test]
    fn signed_block_verification() {
        let client = client("s3kr1t");
        let canonical = "11000|merch_042";
        let good = SignedBlock { signature: hmac_sha256_hex("s3kr1t", canonical.as_bytes()) };
        client.verify_signed(canonical, Some(&good)).unwrap();
        let bad = SignedBlock { signature: hmac_sha256_hex("wrong-key", canonical.as_bytes()) };
        assert!(matches!(client.verify_signed(canonical, Some(&bad)), Err(OrchestratorError::InvalidSignature)));
        assert!(matches!(client.verify_signed(canonical, None), Err(OrchestratorError::InvalidSignature)));
    }
}
