use chrono::Duration;
use hpg_common::Money;
use thiserror::Error;

use crate::{
    db_types::{
        Charge,
        ChargeStatus,
        ChargeStatusEntry,
        GatewayId,
        NewCharge,
        NewOrder,
        NewOrderItem,
        NewTransaction,
        Order,
        OrderId,
        OrderItem,
        OrderNote,
        OrderStatus,
        Transaction,
        TransactionKind,
    },
    traits::OrderQueryFilter,
};

#[derive(Debug, Clone, Error)]
pub enum SettlementDatabaseError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("Charge not found: {0}")]
    ChargeNotFound(String),
    #[error("Cannot insert the record because it would violate a constraint. {0}")]
    ConstraintViolation(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for SettlementDatabaseError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => SettlementDatabaseError::OrderNotFound("no matching row".into()),
            sqlx::Error::Database(de) if de.is_unique_violation() => {
                SettlementDatabaseError::ConstraintViolation(de.to_string())
            },
            other => SettlementDatabaseError::DatabaseError(other.to_string()),
        }
    }
}

/// The storage backend contract for the settlement engine.
///
/// The store is the synchronization point for everything concurrent in the system: idempotency markers must be
/// unique-constrained inserts, and order + items must commit as one unit. Backends are cheap to clone (a pool
/// handle).
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone + Send + Sync {
    /// The URL of the database.
    fn url(&self) -> &str;

    //----------------------------------        Orders         -------------------------------------------------------

    /// Persist a new order and its items in a single atomic transaction, assigning the next sequential order number.
    /// Either the order and every item commit, or nothing does.
    async fn insert_order(
        &self,
        order: NewOrder,
        items: Vec<NewOrderItem>,
    ) -> Result<(Order, Vec<OrderItem>), SettlementDatabaseError>;

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, SettlementDatabaseError>;

    async fn fetch_order_by_number(&self, order_number: &OrderId) -> Result<Option<Order>, SettlementDatabaseError>;

    /// Locate the order a provider payment id refers to, via the stored `transaction_id` meta or an open charge.
    async fn fetch_order_by_payment_id(
        &self,
        gateway: GatewayId,
        payment_id: &str,
    ) -> Result<Option<Order>, SettlementDatabaseError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, SettlementDatabaseError>;

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, SettlementDatabaseError>;

    /// Set the order status unconditionally and return the updated record. Transition legality is the caller's
    /// concern ([`crate::order_flow::OrderFlowApi`]); the store just writes.
    async fn update_order_status(&self, order_id: i64, status: OrderStatus) -> Result<Order, SettlementDatabaseError>;

    /// Attach the gateway and its payment id to the order (set once at payment creation).
    async fn set_payment_reference(
        &self,
        order_id: i64,
        gateway: GatewayId,
        transaction_id: &str,
    ) -> Result<Order, SettlementDatabaseError>;

    async fn add_order_note(&self, order_id: i64, note: &str) -> Result<OrderNote, SettlementDatabaseError>;

    async fn fetch_order_notes(&self, order_id: i64) -> Result<Vec<OrderNote>, SettlementDatabaseError>;

    /// Sum of `total` over completed and processing orders in the current calendar month (UTC). Drives tier
    /// selection.
    async fn gmv_for_current_month(&self) -> Result<Money, SettlementDatabaseError>;

    //----------------------------------     Transactions       ------------------------------------------------------

    async fn insert_transaction(&self, tx: NewTransaction) -> Result<Transaction, SettlementDatabaseError>;

    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<Transaction>, SettlementDatabaseError>;

    /// Whether a transaction for this gateway event already exists. Guards against double-counting when the same
    /// settlement arrives via both webhook and poll.
    async fn transaction_exists(
        &self,
        gateway: GatewayId,
        external_id: &str,
        kind: TransactionKind,
    ) -> Result<bool, SettlementDatabaseError>;

    //----------------------------------    Webhook markers      -----------------------------------------------------

    /// Record that `(gateway, event_id)` has been accepted for processing. Returns `true` if this call created the
    /// marker, `false` if it already existed. Must be an atomic unique-constrained insert: of two concurrent calls,
    /// exactly one observes `true`.
    async fn try_mark_event(&self, gateway: GatewayId, event_id: &str) -> Result<bool, SettlementDatabaseError>;

    /// Delete markers older than the retention window. Returns the number pruned.
    async fn prune_event_markers(&self, older_than: Duration) -> Result<u64, SettlementDatabaseError>;

    //----------------------------------        Charges          -----------------------------------------------------

    /// Persist a new charge and append the opening `created` entry to its status history.
    async fn insert_charge(&self, charge: NewCharge) -> Result<Charge, SettlementDatabaseError>;

    /// The order's most recent non-terminal charge, if any.
    async fn fetch_active_charge(&self, order_id: i64) -> Result<Option<Charge>, SettlementDatabaseError>;

    async fn fetch_charge_by_provider_id(
        &self,
        gateway: GatewayId,
        charge_id: &str,
    ) -> Result<Option<Charge>, SettlementDatabaseError>;

    /// Move the charge to `status`, appending to its history. A same-status update is a no-op and does not grow the
    /// history.
    async fn update_charge_status(&self, id: i64, status: ChargeStatus) -> Result<Charge, SettlementDatabaseError>;

    async fn charge_history(&self, id: i64) -> Result<Vec<ChargeStatusEntry>, SettlementDatabaseError>;
}
