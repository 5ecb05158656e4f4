use hng_payment_engine::{
    db_types::{ChargeStatus, GatewayId},
    traits::{ChargeRequest, PaymentProvider, ProviderCharge, ProviderError},
};
use hpg_common::Money;
use mockall::mock;

mock! {
    pub PixProvider {}
    impl PaymentProvider for PixProvider {
        fn gateway(&self) -> GatewayId;
        async fn create_charge(&self, request: &ChargeRequest) -> Result<ProviderCharge, ProviderError>;
        async fn get_status(&self, charge_id: &str) -> Result<ChargeStatus, ProviderError>;
        async fn cancel_charge(&self, charge_id: &str) -> Result<(), ProviderError>;
        async fn refund(&self, charge_id: &str, amount: Option<Money>) -> Result<(), ProviderError>;
        fn supports_partial_refund(&self) -> bool;
    }
}
