use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use hng_payment_engine::{ChargeError, OrderFlowError};
use thiserror::Error;

use crate::orchestrator::OrchestratorError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Payload deserialization error")]
    CouldNotDeserializePayload,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Webhook rejected. {0}")]
    WebhookError(#[from] WebhookError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Checkout request is invalid. {0}")]
    InvalidCheckout(String),
    #[error("The checkout session token is missing or invalid.")]
    InvalidSessionToken,
    #[error("Payment was refused. {0}")]
    PaymentRefused(String),
    #[error("No PIX-capable payment provider is enabled.")]
    PixUnavailable,
    #[error("The charge cannot be acted on. {0}")]
    ChargeConflict(String),
    #[error("An upstream provider call failed. {0}")]
    UpstreamError(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CouldNotDeserializePayload => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCheckout(_) => StatusCode::BAD_REQUEST,
            Self::ChargeConflict(_) => StatusCode::BAD_REQUEST,
            Self::PixUnavailable => StatusCode::BAD_REQUEST,
            Self::InvalidSessionToken => StatusCode::FORBIDDEN,
            Self::PaymentRefused(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::WebhookError(e) => e.status_code(),
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "success": false, "message": self.to_string() }).to_string())
    }
}

/// Failures along the webhook ingestion pipeline. Each stage short-circuits with one of these; the status codes are
/// part of the contract with the providers' retry logic.
#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("Webhook processing is delegated to the orchestration service.")]
    Delegated,
    #[error("The caller's address is not on the gateway's whitelist.")]
    ForbiddenPeer,
    #[error("Too many webhook deliveries for this gateway. Slow down.")]
    RateLimited,
    #[error("No webhook secret is configured for this gateway.")]
    MissingSecret,
    #[error("The request carries no signature.")]
    MissingSignature,
    #[error("The request signature does not match the body.")]
    InvalidSignature,
    #[error("Unknown gateway: {0}")]
    UnknownGateway(String),
    #[error("Could not parse the webhook payload. {0}")]
    MalformedPayload(String),
    #[error("The event does not resolve to a known order. {0}")]
    OrderNotResolved(String),
    #[error("Could not fetch payment details from the provider. {0}")]
    UpstreamLookup(String),
}

impl WebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Delegated => StatusCode::GONE,
            Self::ForbiddenPeer => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingSecret => StatusCode::UNAUTHORIZED,
            Self::MissingSignature => StatusCode::UNAUTHORIZED,
            Self::InvalidSignature => StatusCode::FORBIDDEN,
            Self::UnknownGateway(_) => StatusCode::NOT_FOUND,
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::OrderNotResolved(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamLookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        match e {
            OrderFlowError::MissingBillingFields(_) | OrderFlowError::EmptyCart => {
                Self::InvalidCheckout(e.to_string())
            },
            OrderFlowError::OrderNotFound(s) => Self::NoRecordFound(s),
            OrderFlowError::InvalidTransition { .. } | OrderFlowError::TransitionNoOp(_) => {
                Self::InvalidCheckout(e.to_string())
            },
            OrderFlowError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
            OrderFlowError::LedgerError(e) => Self::BackendError(format!("Ledger error: {e}")),
        }
    }
}

impl From<ChargeError> for ServerError {
    fn from(e: ChargeError) -> Self {
        match e {
            ChargeError::OrderNotFound(s) => Self::NoRecordFound(s),
            ChargeError::NonPositiveTotal => Self::InvalidCheckout(e.to_string()),
            ChargeError::NoCharge(s) => Self::NoRecordFound(format!("No charge for order {s}")),
            ChargeError::ChargeStillActive { .. } => Self::ChargeConflict(e.to_string()),
            ChargeError::ProviderError(e) => Self::UpstreamError(e.to_string()),
            ChargeError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
            ChargeError::LedgerError(e) => Self::BackendError(format!("Ledger error: {e}")),
        }
    }
}

impl From<OrchestratorError> for ServerError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::MerchantBanned => Self::PaymentRefused(e.to_string()),
            OrchestratorError::InvalidSignature => Self::PaymentRefused(e.to_string()),
            OrchestratorError::Rejected(m) => Self::PaymentRefused(m),
            other => Self::UpstreamError(other.to_string()),
        }
    }
}
