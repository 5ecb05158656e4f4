//! The tiered fee calculator.
//!
//! Platform fees are a percentage of the sale amount, where the percentage depends on the product type and on the
//! store's gross merchandise volume for the current calendar month. Gateway fees come from a static
//! per-gateway/per-method table. All local results are a *fallback*: the orchestrator service is the authority on
//! fees, and transactions settled on local numbers are flagged `is_fallback` for later audit.
//!
//! There is deliberately no error path out of the calculator itself. A remote tier fetch that fails keeps the
//! last-good (or compiled-in) schedule, and the worst case is default-tier pricing.

mod calculator;
mod schedule;
mod tier_source;

pub use calculator::{FeeBreakdown, FeeCalculator, FeeFormula, GatewayFeePolicy};
pub use schedule::{FeeSchedule, FeeTier, ProductRates, MINIMUM_FEE};
pub use tier_source::{CachedTierSource, StaticTierSource, TierSource, DEFAULT_TIER_CACHE_TTL};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FeeError {
    #[error("Could not fetch the fee schedule from the remote source. {0}")]
    RemoteFetch(String),
    #[error("The fee schedule is invalid. {0}")]
    InvalidSchedule(String),
}
