//! The reconciliation sweep.
//!
//! Webhooks get lost. Every `reconcile_interval` the worker polls the provider for any PIX ledger entry that has sat
//! pending longer than the staleness threshold and feeds the resulting events through the same transition function
//! the webhook pipeline uses, so a missed delivery delays settlement instead of losing it. The same tick prunes
//! webhook idempotency markers past their retention window.
use hng_payment_engine::{
    events::EventProducers,
    fees::{CachedTierSource, GatewayFeePolicy, DEFAULT_TIER_CACHE_TTL},
    traits::{PaymentProvider, SettlementBackend},
    ChargeApi,
    FeeApi,
    OrderFlowApi,
    SqliteDatabase,
};
use log::*;
use tokio::time::MissedTickBehavior;

use crate::{
    config::ServerConfig,
    orchestrator::{OrchestratorClient, OrchestratorTierSource},
    providers::RestPixProvider,
};

pub fn start_reconcile_worker(
    config: &ServerConfig,
    db: SqliteDatabase,
    orchestrator: OrchestratorClient,
    provider: Option<RestPixProvider>,
) {
    let interval = config.reconcile_interval;
    let staleness = config.staleness_threshold;
    let retention = config.marker_retention;
    tokio::spawn(async move {
        info!("🕰️ Reconciliation worker running every {}s", interval.as_secs());
        let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
        let tiers = CachedTierSource::new(OrchestratorTierSource::new(orchestrator), DEFAULT_TIER_CACHE_TTL);
        let fees = FeeApi::new(db.clone(), tiers, GatewayFeePolicy::default());
        let charges = provider.map(|p| ChargeApi::new(db, p));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_sweep(&orders, &fees, charges.as_ref(), staleness, retention).await;
        }
    });
}

async fn run_sweep<B, P>(
    orders: &OrderFlowApi<B>,
    fees: &FeeApi<B, OrchestratorTierSource>,
    charges: Option<&ChargeApi<B, P>>,
    staleness: chrono::Duration,
    retention: chrono::Duration,
) where
    B: SettlementBackend,
    P: PaymentProvider,
{
    if let Some(charges) = charges {
        match charges.reconcile_pending(staleness).await {
            Ok(events) if events.is_empty() => trace!("🕰️ Nothing to reconcile"),
            Ok(events) => {
                info!("🕰️ Reconciliation produced {} event(s)", events.len());
                let calculator = fees.calculator().await;
                for event in events {
                    let is_fallback = event.gateway_fee.is_none();
                    if let Err(e) = orders.apply_payment_event(event, &calculator, is_fallback).await {
                        warn!("🕰️ Could not apply reconciled event: {e}");
                    }
                }
            },
            Err(e) => warn!("🕰️ Reconciliation sweep failed: {e}"),
        }
    }
    match orders.prune_event_markers(retention).await {
        Ok(0) => {},
        Ok(n) => debug!("🕰️ Pruned {n} expired webhook event marker(s)"),
        Err(e) => warn!("🕰️ Could not prune webhook event markers: {e}"),
    }
}
