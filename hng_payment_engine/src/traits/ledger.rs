use chrono::Duration;
use hpg_common::Money;
use thiserror::Error;

use crate::db_types::{LedgerEntry, LedgerStatus, PaymentMethod};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),
    #[error("Ledger storage error: {0}")]
    StorageError(String),
}

/// The bookkeeping collaborator.
///
/// The engine writes one pending entry per outstanding charge and settles or cancels it when the charge resolves.
/// `stale_pending` drives the reconciliation sweep: entries that stay pending past the staleness threshold are the
/// charges whose webhooks may have been lost.
#[allow(async_fn_in_trait)]
pub trait Ledger: Clone + Send + Sync {
    async fn insert_pending(
        &self,
        order_id: i64,
        method: PaymentMethod,
        amount: Money,
        reference: &str,
        note: Option<String>,
    ) -> Result<LedgerEntry, LedgerError>;

    /// Move the entry with the given provider reference to a new status.
    async fn update_status_by_reference(
        &self,
        reference: &str,
        status: LedgerStatus,
    ) -> Result<LedgerEntry, LedgerError>;

    /// All pending entries for `method` created more than `older_than` ago.
    async fn stale_pending(&self, method: PaymentMethod, older_than: Duration)
        -> Result<Vec<LedgerEntry>, LedgerError>;
}
