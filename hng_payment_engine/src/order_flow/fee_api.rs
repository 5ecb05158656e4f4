use hpg_common::Money;

use crate::{
    db_types::{GatewayId, PaymentMethod, ProductType},
    fees::{CachedTierSource, FeeBreakdown, FeeCalculator, GatewayFeePolicy, TierSource},
    order_flow::OrderFlowError,
    traits::SettlementDatabase,
};

/// Glues the pure fee calculator to its two inputs: the store's current-month GMV and the cached (possibly remote)
/// tier schedule.
pub struct FeeApi<B, T: TierSource> {
    db: B,
    tiers: CachedTierSource<T>,
    policy: GatewayFeePolicy,
}

impl<B, T> FeeApi<B, T>
where
    B: SettlementDatabase,
    T: TierSource,
{
    pub fn new(db: B, tiers: CachedTierSource<T>, policy: GatewayFeePolicy) -> Self {
        Self { db, tiers, policy }
    }

    /// A calculator over the current schedule snapshot. Never fails; worst case is the compiled-in defaults.
    pub async fn calculator(&self) -> FeeCalculator {
        FeeCalculator::new(self.tiers.current().await, self.policy.clone())
    }

    /// The commission rate (basis points) that applies to a sale of `product_type` right now.
    pub async fn current_rate_bps(&self, product_type: ProductType) -> Result<i64, OrderFlowError> {
        let gmv = self.db.gmv_for_current_month().await?;
        let calculator = self.calculator().await;
        Ok(calculator.tier_for(gmv).rates.rate_for(product_type))
    }

    pub async fn breakdown(
        &self,
        amount: Money,
        product_type: ProductType,
        gateway: GatewayId,
        method: PaymentMethod,
    ) -> Result<FeeBreakdown, OrderFlowError> {
        let gmv = self.db.gmv_for_current_month().await?;
        let calculator = self.calculator().await;
        Ok(calculator.all_fees(amount, product_type, gmv, gateway, method))
    }
}
