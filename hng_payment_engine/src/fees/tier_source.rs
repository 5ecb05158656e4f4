use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::*;
use tokio::sync::RwLock;

use crate::fees::{FeeError, FeeSchedule};

/// A source of fee-schedule overrides (typically the remote orchestration service).
#[allow(async_fn_in_trait)]
pub trait TierSource: Send + Sync {
    async fn fetch_schedule(&self) -> Result<FeeSchedule, FeeError>;
}

/// A fixed schedule. Used when no remote source is configured, and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTierSource {
    schedule: FeeSchedule,
}

impl StaticTierSource {
    pub fn new(schedule: FeeSchedule) -> Self {
        Self { schedule }
    }
}

impl TierSource for StaticTierSource {
    async fn fetch_schedule(&self) -> Result<FeeSchedule, FeeError> {
        Ok(self.schedule.clone())
    }
}

struct CacheSlot {
    schedule: FeeSchedule,
    fetched_at: Option<Instant>,
}

/// TTL cache over a [`TierSource`].
///
/// `current()` never fails: before the first successful fetch it serves the compiled-in defaults, and a failed
/// refresh keeps the last-good schedule. The remote source can therefore be slow or down without affecting checkout.
pub struct CachedTierSource<T: TierSource> {
    inner: T,
    ttl: Duration,
    slot: Arc<RwLock<CacheSlot>>,
}

pub const DEFAULT_TIER_CACHE_TTL: Duration = Duration::from_secs(300);

impl<T: TierSource> CachedTierSource<T> {
    pub fn new(inner: T, ttl: Duration) -> Self {
        let slot = CacheSlot { schedule: FeeSchedule::default(), fetched_at: None };
        Self { inner, ttl, slot: Arc::new(RwLock::new(slot)) }
    }

    pub async fn current(&self) -> FeeSchedule {
        {
            let slot = self.slot.read().await;
            if let Some(at) = slot.fetched_at {
                if at.elapsed() < self.ttl {
                    return slot.schedule.clone();
                }
            }
        }
        let mut slot = self.slot.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(at) = slot.fetched_at {
            if at.elapsed() < self.ttl {
                return slot.schedule.clone();
            }
        }
        match self.inner.fetch_schedule().await {
            Ok(schedule) => {
                debug!("🏷️️ Fee schedule refreshed ({} tiers)", schedule.tiers().len());
                slot.schedule = schedule;
                slot.fetched_at = Some(Instant::now());
            },
            Err(e) => {
                warn!("🏷️️ Fee schedule refresh failed, keeping the current schedule. {e}");
                // Push the next attempt out a full TTL so a dead remote isn't hammered on every checkout.
                slot.fetched_at = Some(Instant::now());
            },
        }
        slot.schedule.clone()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hpg_common::Money;

    use super::*;
    use crate::fees::{FeeTier, ProductRates};

    struct FlakySource {
        calls: AtomicUsize,
    }

    fn one_tier_schedule(physical_bps: i64) -> FeeSchedule {
        FeeSchedule::new(vec![FeeTier {
            id: 1,
            min: Money::ZERO,
            max: None,
            rates: ProductRates {
                physical: physical_bps,
                digital: physical_bps,
                subscription: physical_bps,
                quote: physical_bps,
                appointment: physical_bps,
            },
        }])
        .unwrap()
    }

    impl TierSource for FlakySource {
        async fn fetch_schedule(&self) -> Result<FeeSchedule, FeeError> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(one_tier_schedule(100)),
                _ => Err(FeeError::RemoteFetch("boom".into())),
            }
        }
    }

    #[tokio::test]
    async fn failed_refresh_keeps_last_good_schedule() {
        let source = CachedTierSource::new(FlakySource { calls: AtomicUsize::new(0) }, Duration::ZERO);
        let first = source.current().await;
        assert_eq!(first.tiers().len(), 1);
        // TTL is zero, so this triggers a refresh, which fails. Last-good must survive.
        let second = source.current().await;
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn cache_serves_defaults_before_first_fetch() {
        struct NeverSource;
        impl TierSource for NeverSource {
            async fn fetch_schedule(&self) -> Result<FeeSchedule, FeeError> {
                Err(FeeError::RemoteFetch("offline".into()))
            }
        }
        let source = CachedTierSource::new(NeverSource, DEFAULT_TIER_CACHE_TTL);
        assert_eq!(source.current().await, FeeSchedule::default());
    }
}
