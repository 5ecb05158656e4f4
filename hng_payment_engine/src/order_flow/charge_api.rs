use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{Charge, ChargeStatus, Order, PaymentEvent, PaymentEventKind, PaymentMethod},
    order_flow::{ChargeError, ChargePoll},
    traits::{ChargeRequest, Ledger, PaymentProvider, SettlementDatabase},
};

/// How long a fresh PIX charge stays payable.
pub const DEFAULT_CHARGE_LIFETIME: Duration = Duration::hours(1);
/// Pending ledger entries older than this are re-checked by the reconciliation sweep.
pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::minutes(30);

/// The PIX-style asynchronous charge state machine.
///
/// A charge moves `created → paid | expired | refunded`, driven by webhooks, short-polls and the reconciliation
/// sweep. This API never transitions orders itself: anything that implies an order change comes back as a
/// [`PaymentEvent`] for the caller to put through `OrderFlowApi::apply_payment_event`, the same function the webhook
/// path uses.
pub struct ChargeApi<B, P> {
    db: B,
    provider: P,
    charge_lifetime: Duration,
}

impl<B, P> Debug for ChargeApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChargeApi")
    }
}

impl<B, P> ChargeApi<B, P>
where
    B: SettlementDatabase + Ledger,
    P: PaymentProvider,
{
    pub fn new(db: B, provider: P) -> Self {
        Self { db, provider, charge_lifetime: DEFAULT_CHARGE_LIFETIME }
    }

    pub fn with_charge_lifetime(mut self, lifetime: Duration) -> Self {
        self.charge_lifetime = lifetime;
        self
    }

    /// Open a charge for the order.
    ///
    /// Idempotent: if a live charge already exists it is returned as-is. Fails if the order total is not positive.
    /// On success the charge, its opening history entry, the order's payment reference and a pending ledger entry
    /// are all persisted.
    pub async fn init_charge(&self, order_id: i64) -> Result<Charge, ChargeError> {
        let order = self.fetch_order(order_id).await?;
        if !order.total.is_positive() {
            return Err(ChargeError::NonPositiveTotal);
        }
        if let Some(existing) = self.db.fetch_active_charge(order_id).await? {
            if existing.expires_at > Utc::now() {
                debug!("🧲️ Order [{}] already has live charge [{}]", order.order_number, existing.charge_id);
                return Ok(existing);
            }
        }
        let charge = self.open_charge(&order, None).await?;
        Ok(charge)
    }

    /// Fetch the provider's live view of the order's charge.
    ///
    /// Appends nothing itself; a status that implies a change comes back as an event in the result. A charge the
    /// provider still reports `created` but whose local expiry has passed is reported as expired.
    pub async fn poll(&self, order_id: i64) -> Result<ChargePoll, ChargeError> {
        let order = self.fetch_order(order_id).await?;
        let charge = self
            .db
            .fetch_active_charge(order_id)
            .await?
            .ok_or_else(|| ChargeError::NoCharge(order.order_number.to_string()))?;
        let provider_status = self.provider.get_status(&charge.charge_id).await?;
        let status = if provider_status == ChargeStatus::Created && Utc::now() >= charge.expires_at {
            ChargeStatus::Expired
        } else {
            provider_status
        };
        let event = self.event_for(&charge, &order, status);
        Ok(ChargePoll { expires_at: charge.expires_at, charge, status, event })
    }

    /// Replace an expired charge with a fresh one.
    ///
    /// Refused while the current charge is still payable. The old charge is cancelled best-effort at the provider
    /// and marked expired locally; the new ledger entry records which charge it supersedes.
    pub async fn regenerate(&self, order_id: i64) -> Result<Charge, ChargeError> {
        let order = self.fetch_order(order_id).await?;
        let old = self
            .db
            .fetch_active_charge(order_id)
            .await?
            .ok_or_else(|| ChargeError::NoCharge(order.order_number.to_string()))?;
        if Utc::now() < old.expires_at {
            return Err(ChargeError::ChargeStillActive { expires_at: old.expires_at });
        }
        if let Err(e) = self.provider.cancel_charge(&old.charge_id).await {
            warn!("🧲️ Could not cancel expired charge [{}] at the provider: {e}", old.charge_id);
        }
        self.db.update_charge_status(old.id, ChargeStatus::Expired).await?;
        let charge = self.open_charge(&order, Some(&old.charge_id)).await?;
        info!("🧲️ Charge for order [{}] regenerated: [{}] supersedes [{}]", order.order_number, charge.charge_id, old.charge_id);
        Ok(charge)
    }

    /// The safety net against missed webhooks.
    ///
    /// Re-checks every pending PIX ledger entry older than `staleness` against the provider, and returns the
    /// normalized events for the caller to apply. Each entry is handled independently, so the sweep can be stopped
    /// between iterations without corrupting anything.
    pub async fn reconcile_pending(&self, staleness: Duration) -> Result<Vec<PaymentEvent>, ChargeError> {
        let stale = self.db.stale_pending(PaymentMethod::Pix, staleness).await?;
        if stale.is_empty() {
            return Ok(Vec::new());
        }
        debug!("🕰️ Reconciling {} stale pending charge(s)", stale.len());
        let mut events = Vec::new();
        for entry in stale {
            let Some(charge) = self.db.fetch_charge_by_provider_id(self.provider.gateway(), &entry.reference).await?
            else {
                warn!("🕰️ Ledger entry [{}] has no matching charge; skipping", entry.reference);
                continue;
            };
            let status = match self.provider.get_status(&charge.charge_id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("🕰️ Could not fetch status for charge [{}]: {e}", charge.charge_id);
                    continue;
                },
            };
            let status = if status == ChargeStatus::Created && Utc::now() >= charge.expires_at {
                ChargeStatus::Expired
            } else {
                status
            };
            let Some(order) = self.db.fetch_order_by_id(charge.order_id).await? else {
                warn!("🕰️ Charge [{}] references missing order {}", charge.charge_id, charge.order_id);
                continue;
            };
            if let Some(event) = self.event_for(&charge, &order, status) {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn event_for(&self, charge: &Charge, order: &Order, status: ChargeStatus) -> Option<PaymentEvent> {
        let kind = match status {
            ChargeStatus::Created => return None,
            ChargeStatus::Paid => PaymentEventKind::Paid,
            ChargeStatus::Expired => PaymentEventKind::Overdue,
            ChargeStatus::Refunded => PaymentEventKind::Refunded,
        };
        let mut event = PaymentEvent::new(charge.gateway, kind);
        event.payment_id = Some(charge.charge_id.clone());
        event.order_ref = Some(order.order_number.clone());
        event.amount = Some(order.total);
        Some(event)
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Order, ChargeError> {
        self.db
            .fetch_order_by_id(order_id)
            .await?
            .ok_or_else(|| ChargeError::OrderNotFound(format!("id {order_id}")))
    }

    async fn open_charge(&self, order: &Order, supersedes: Option<&str>) -> Result<Charge, ChargeError> {
        let request = ChargeRequest {
            order_id: order.id,
            order_number: order.order_number.clone(),
            amount: order.total,
            customer_email: order.billing.billing_email.clone(),
            customer_name: format!("{} {}", order.billing.billing_first_name, order.billing.billing_last_name),
            expires_in: self.charge_lifetime,
        };
        let opened = self.provider.create_charge(&request).await?;
        let charge = self
            .db
            .insert_charge(crate::db_types::NewCharge {
                order_id: order.id,
                gateway: self.provider.gateway(),
                charge_id: opened.charge_id.clone(),
                qr_code: opened.qr_code,
                expires_at: opened.expires_at,
            })
            .await?;
        self.db.set_payment_reference(order.id, self.provider.gateway(), &charge.charge_id).await?;
        let note = supersedes.map(|old| format!("Regenerated from charge {old}."));
        self.db.insert_pending(order.id, PaymentMethod::Pix, order.total, &charge.charge_id, note).await?;
        Ok(charge)
    }
}
