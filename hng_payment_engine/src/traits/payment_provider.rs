use hpg_common::Money;
use thiserror::Error;

use crate::{
    db_types::{ChargeStatus, GatewayId},
    traits::{ChargeRequest, ProviderCharge},
};

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("The provider could not be reached. {0}")]
    Unreachable(String),
    #[error("The provider rejected the request. {0}")]
    Rejected(String),
    #[error("The provider does not know this charge: {0}")]
    UnknownCharge(String),
    #[error("The provider sent a response we could not interpret. {0}")]
    Protocol(String),
}

/// The adapter contract for a PIX-capable payment gateway.
///
/// Implementations are stateless HTTP clients. All charge lifecycle logic (expiry, regeneration, reconciliation)
/// stays in [`crate::order_flow::ChargeApi`]; an adapter only translates these five calls into the provider's API.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider: Send + Sync {
    /// Which gateway this adapter talks to.
    fn gateway(&self) -> GatewayId;

    /// Open a new charge. The returned `charge_id` must be stable for the lifetime of the charge.
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ProviderCharge, ProviderError>;

    /// Fetch the provider's current view of the charge, normalized to [`ChargeStatus`].
    async fn get_status(&self, charge_id: &str) -> Result<ChargeStatus, ProviderError>;

    /// Cancel an open charge. Called best-effort during regeneration; failures are logged, not propagated.
    async fn cancel_charge(&self, charge_id: &str) -> Result<(), ProviderError>;

    /// Refund a paid charge. `amount: None` means a full refund.
    async fn refund(&self, charge_id: &str, amount: Option<Money>) -> Result<(), ProviderError>;

    /// Whether [`PaymentProvider::refund`] may be called with a partial amount.
    fn supports_partial_refund(&self) -> bool;
}
