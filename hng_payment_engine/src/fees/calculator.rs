use std::collections::HashMap;

use hpg_common::Money;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{GatewayId, PaymentMethod, ProductType},
    fees::{FeeSchedule, FeeTier, MINIMUM_FEE},
};

//--------------------------------------      FeeFormula      ---------------------------------------------------------
/// How a gateway charges for a given payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum FeeFormula {
    /// A percentage of the amount, in basis points.
    Percentage { bps: i64 },
    /// A flat fee per transaction.
    Fixed { amount: Money },
    /// Percentage plus a flat component.
    Mixed { bps: i64, fixed: Money },
}

impl FeeFormula {
    pub fn apply(&self, amount: Money) -> Money {
        match *self {
            FeeFormula::Percentage { bps } => amount.percentage_bps(bps),
            FeeFormula::Fixed { amount: fixed } => fixed,
            FeeFormula::Mixed { bps, fixed } => amount.percentage_bps(bps) + fixed,
        }
    }
}

/// The built-in gateway fee table. Exhaustive over gateway and method so that adding a gateway forces a decision
/// here; combinations the checkout preference order never selects still get a sane entry.
fn default_formula(gateway: GatewayId, method: PaymentMethod) -> FeeFormula {
    use GatewayId::*;
    use PaymentMethod::*;
    match (gateway, method) {
        (Asaas, Pix) => FeeFormula::Fixed { amount: Money::from_cents(199) },
        (Asaas, CreditCard) => FeeFormula::Mixed { bps: 299, fixed: Money::from_cents(49) },
        (Asaas, Boleto) => FeeFormula::Fixed { amount: Money::from_cents(199) },
        (MercadoPago, Pix) => FeeFormula::Percentage { bps: 99 },
        (MercadoPago, CreditCard) => FeeFormula::Percentage { bps: 498 },
        (MercadoPago, Boleto) => FeeFormula::Fixed { amount: Money::from_cents(349) },
        (PagSeguro, Pix) => FeeFormula::Percentage { bps: 99 },
        (PagSeguro, CreditCard) => FeeFormula::Mixed { bps: 319, fixed: Money::from_cents(40) },
        (PagSeguro, Boleto) => FeeFormula::Fixed { amount: Money::from_cents(349) },
        (PicPay, Pix) => FeeFormula::Percentage { bps: 99 },
        (PicPay, CreditCard) => FeeFormula::Percentage { bps: 349 },
        (PicPay, Boleto) => FeeFormula::Fixed { amount: Money::from_cents(349) },
    }
}

//--------------------------------------   GatewayFeePolicy   ---------------------------------------------------------
/// Per-deployment overrides of the built-in gateway fee table, e.g. a negotiated rate with one gateway.
#[derive(Debug, Clone, Default)]
pub struct GatewayFeePolicy {
    overrides: HashMap<(GatewayId, PaymentMethod), FeeFormula>,
}

impl GatewayFeePolicy {
    pub fn with_override(mut self, gateway: GatewayId, method: PaymentMethod, formula: FeeFormula) -> Self {
        self.overrides.insert((gateway, method), formula);
        self
    }

    pub fn formula_for(&self, gateway: GatewayId, method: PaymentMethod) -> FeeFormula {
        self.overrides.get(&(gateway, method)).copied().unwrap_or_else(|| default_formula(gateway, method))
    }
}

//--------------------------------------     FeeBreakdown     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub amount: Money,
    pub tier_used: i64,
    pub plugin_fee: Money,
    pub gateway_fee: Money,
    /// What the merchant keeps: `amount - plugin_fee - gateway_fee`.
    pub net: Money,
}

//--------------------------------------    FeeCalculator     ---------------------------------------------------------
/// Pure fee arithmetic over a schedule snapshot. Construct one per calculation from the current schedule (see
/// [`crate::fees::CachedTierSource`]); it holds no I/O and cannot fail.
#[derive(Debug, Clone, Default)]
pub struct FeeCalculator {
    schedule: FeeSchedule,
    policy: GatewayFeePolicy,
}

impl FeeCalculator {
    pub fn new(schedule: FeeSchedule, policy: GatewayFeePolicy) -> Self {
        Self { schedule, policy }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    pub fn tier_for(&self, gmv: Money) -> &FeeTier {
        self.schedule.tier_for(gmv)
    }

    /// The platform fee for an amount at the given tier, clamped to [`MINIMUM_FEE`].
    pub fn plugin_fee(&self, amount: Money, product_type: ProductType, tier: &FeeTier) -> Money {
        let fee = amount.percentage_bps(tier.rates.rate_for(product_type));
        fee.max(MINIMUM_FEE)
    }

    pub fn gateway_fee(&self, amount: Money, gateway: GatewayId, method: PaymentMethod) -> Money {
        self.policy.formula_for(gateway, method).apply(amount)
    }

    pub fn all_fees(
        &self,
        amount: Money,
        product_type: ProductType,
        gmv: Money,
        gateway: GatewayId,
        method: PaymentMethod,
    ) -> FeeBreakdown {
        let tier = self.tier_for(gmv);
        let plugin_fee = self.plugin_fee(amount, product_type, tier);
        let gateway_fee = self.gateway_fee(amount, gateway, method);
        FeeBreakdown { amount, tier_used: tier.id, plugin_fee, gateway_fee, net: amount - plugin_fee - gateway_fee }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn minimum_fee_floor() {
        // Tier 1, physical, 1.99% of 10.00 = 0.20 → clamps to the 0.50 floor.
        let calc = FeeCalculator::default();
        let tier = calc.tier_for(Money::ZERO);
        assert_eq!(calc.plugin_fee(Money::from_units(10), ProductType::Physical, tier), Money::from_cents(50));
        // 1.99% of 1,000.00 = 19.90, above the floor.
        assert_eq!(calc.plugin_fee(Money::from_units(1_000), ProductType::Physical, tier), Money::from_cents(1_990));
    }

    #[test]
    fn fee_is_monotone_in_tier() {
        let calc = FeeCalculator::default();
        let amount = Money::from_units(500);
        for pt in [ProductType::Physical, ProductType::Digital, ProductType::Subscription] {
            let mut last = Money::MAX;
            for tier in calc.schedule().tiers() {
                let fee = calc.plugin_fee(amount, pt, tier);
                assert!(fee <= last, "tier {} fee regressed for {pt}", tier.id);
                assert!(fee >= MINIMUM_FEE);
                last = fee;
            }
        }
    }

    #[test]
    fn gateway_formulas() {
        let calc = FeeCalculator::default();
        let amount = Money::from_units(110);
        // Asaas PIX is flat 1.99
        assert_eq!(calc.gateway_fee(amount, GatewayId::Asaas, PaymentMethod::Pix), Money::from_cents(199));
        // MercadoPago PIX is 0.99% → 1.09 (rounded)
        assert_eq!(calc.gateway_fee(amount, GatewayId::MercadoPago, PaymentMethod::Pix), Money::from_cents(109));
        // PagSeguro credit card is 3.19% + 0.40 → 3.51 + 0.40
        assert_eq!(
            calc.gateway_fee(amount, GatewayId::PagSeguro, PaymentMethod::CreditCard),
            Money::from_cents(351 + 40)
        );
    }

    #[test]
    fn policy_override_wins() {
        let policy = GatewayFeePolicy::default().with_override(
            GatewayId::Asaas,
            PaymentMethod::Pix,
            FeeFormula::Percentage { bps: 50 },
        );
        let calc = FeeCalculator::new(FeeSchedule::default(), policy);
        assert_eq!(calc.gateway_fee(Money::from_units(100), GatewayId::Asaas, PaymentMethod::Pix), Money::from_cents(50));
        // other combinations untouched
        assert_eq!(calc.gateway_fee(Money::from_units(100), GatewayId::Asaas, PaymentMethod::Boleto), Money::from_cents(199));
    }

    #[test]
    fn breakdown_adds_up() {
        let calc = FeeCalculator::default();
        let b = calc.all_fees(
            Money::from_units(110),
            ProductType::Physical,
            Money::ZERO,
            GatewayId::Asaas,
            PaymentMethod::Pix,
        );
        assert_eq!(b.tier_used, 1);
        assert_eq!(b.plugin_fee, Money::from_cents(219)); // 1.99% of 110.00
        assert_eq!(b.gateway_fee, Money::from_cents(199));
        assert_eq!(b.net, b.amount - b.plugin_fee - b.gateway_fee);
    }
}
