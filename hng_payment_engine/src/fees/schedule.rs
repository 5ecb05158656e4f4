use hpg_common::Money;
use serde::{Deserialize, Serialize};

use crate::{db_types::ProductType, fees::FeeError};

/// The global minimum platform fee. Applies to every tier; a computed fee below this floor is clamped up to it.
pub const MINIMUM_FEE: Money = Money::from_cents(50);

/// Fee percentages for one tier, in basis points, by product type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRates {
    pub physical: i64,
    pub digital: i64,
    pub subscription: i64,
    pub quote: i64,
    pub appointment: i64,
}

impl ProductRates {
    pub fn rate_for(&self, product_type: ProductType) -> i64 {
        match product_type {
            ProductType::Physical => self.physical,
            ProductType::Digital => self.digital,
            ProductType::Subscription => self.subscription,
            ProductType::Quote => self.quote,
            ProductType::Appointment => self.appointment,
        }
    }
}

/// One GMV range of the fee schedule. `max` is inclusive; `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTier {
    pub id: i64,
    pub min: Money,
    pub max: Option<Money>,
    pub rates: ProductRates,
}

impl FeeTier {
    pub fn contains(&self, gmv: Money) -> bool {
        gmv >= self.min && self.max.map(|max| gmv <= max).unwrap_or(true)
    }
}

/// An ordered set of tiers partitioning `[0, ∞)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    tiers: Vec<FeeTier>,
}

impl FeeSchedule {
    /// Build a schedule from a tier list, enforcing the partition invariant: tiers ordered by `min`, starting at
    /// zero, contiguous (each tier starts one cent above its predecessor's max), and the last tier unbounded.
    pub fn new(tiers: Vec<FeeTier>) -> Result<Self, FeeError> {
        if tiers.is_empty() {
            return Err(FeeError::InvalidSchedule("A schedule needs at least one tier".into()));
        }
        if tiers[0].min != Money::ZERO {
            return Err(FeeError::InvalidSchedule("Tier 1 must start at zero".into()));
        }
        for pair in tiers.windows(2) {
            let max = pair[0]
                .max
                .ok_or_else(|| FeeError::InvalidSchedule(format!("Tier {} is unbounded but not last", pair[0].id)))?;
            if pair[1].min != max + Money::from_cents(1) {
                return Err(FeeError::InvalidSchedule(format!(
                    "Gap or overlap between tiers {} and {}",
                    pair[0].id, pair[1].id
                )));
            }
        }
        if tiers.last().expect("non-empty").max.is_some() {
            return Err(FeeError::InvalidSchedule("The last tier must be unbounded".into()));
        }
        Ok(Self { tiers })
    }

    /// Select the tier whose range contains `gmv`. Out-of-range values (only possible for negative GMV, which a sum
    /// of order totals never produces) fall back to tier 1.
    pub fn tier_for(&self, gmv: Money) -> &FeeTier {
        self.tiers.iter().find(|t| t.contains(gmv)).unwrap_or(&self.tiers[0])
    }

    pub fn tiers(&self) -> &[FeeTier] {
        &self.tiers
    }
}

impl Default for FeeSchedule {
    /// The compiled-in schedule. Used until a remote override is fetched, and kept whenever the remote source is
    /// unreachable. GMV boundaries are monthly, in BRL.
    fn default() -> Self {
        let tiers = vec![
            FeeTier {
                id: 1,
                min: Money::ZERO,
                max: Some(Money::from_units(20_000)),
                rates: ProductRates { physical: 199, digital: 249, subscription: 299, quote: 199, appointment: 249 },
            },
            FeeTier {
                id: 2,
                min: Money::from_units(20_000) + Money::from_cents(1),
                max: Some(Money::from_units(100_000)),
                rates: ProductRates { physical: 149, digital: 199, subscription: 249, quote: 149, appointment: 199 },
            },
            FeeTier {
                id: 3,
                min: Money::from_units(100_000) + Money::from_cents(1),
                max: Some(Money::from_units(500_000)),
                rates: ProductRates { physical: 99, digital: 149, subscription: 199, quote: 99, appointment: 149 },
            },
            FeeTier {
                id: 4,
                min: Money::from_units(500_000) + Money::from_cents(1),
                max: None,
                rates: ProductRates { physical: 49, digital: 99, subscription: 149, quote: 49, appointment: 99 },
            },
        ];
        Self::new(tiers).expect("the default schedule partitions [0, ∞)")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_schedule_selects_by_gmv() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.tier_for(Money::ZERO).id, 1);
        assert_eq!(schedule.tier_for(Money::from_units(20_000)).id, 1);
        assert_eq!(schedule.tier_for(Money::from_units(20_000) + Money::from_cents(1)).id, 2);
        assert_eq!(schedule.tier_for(Money::from_units(350_000)).id, 3);
        assert_eq!(schedule.tier_for(Money::from_units(10_000_000)).id, 4);
    }

    #[test]
    fn gappy_schedule_is_rejected() {
        let mut tiers = FeeSchedule::default().tiers().to_vec();
        tiers[1].min = tiers[1].min + Money::from_units(1);
        assert!(matches!(FeeSchedule::new(tiers), Err(FeeError::InvalidSchedule(_))));
    }

    #[test]
    fn bounded_last_tier_is_rejected() {
        let mut tiers = FeeSchedule::default().tiers().to_vec();
        tiers[3].max = Some(Money::from_units(1_000_000));
        assert!(FeeSchedule::new(tiers).is_err());
    }

    #[test]
    fn rates_never_increase_with_tier() {
        use crate::db_types::ProductType::*;
        let schedule = FeeSchedule::default();
        for pt in [Physical, Digital, Subscription, Quote, Appointment] {
            for pair in schedule.tiers().windows(2) {
                assert!(pair[1].rates.rate_for(pt) <= pair[0].rates.rate_for(pt), "{pt} rate increases after tier {}", pair[0].id);
            }
        }
    }
}
