use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::OrderStatus,
    traits::{LedgerError, ProviderError, SettlementDatabaseError},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Missing required billing fields: {0}")]
    MissingBillingFields(String),
    #[error("The cart is empty")]
    EmptyCart,
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("Order {order} cannot move from {from} to {to}")]
    InvalidTransition { order: String, from: OrderStatus, to: OrderStatus },
    /// Not a failure as such: the order is already in the requested state. Callers on the idempotent paths treat
    /// this as success.
    #[error("Order is already in status {0}")]
    TransitionNoOp(OrderStatus),
    #[error(transparent)]
    DatabaseError(#[from] SettlementDatabaseError),
    #[error(transparent)]
    LedgerError(#[from] LedgerError),
}

#[derive(Debug, Clone, Error)]
pub enum ChargeError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("The order total must be positive to open a charge")]
    NonPositiveTotal,
    #[error("Order {0} has no charge to act on")]
    NoCharge(String),
    #[error("The current charge is still active until {expires_at}")]
    ChargeStillActive { expires_at: DateTime<Utc> },
    #[error(transparent)]
    ProviderError(#[from] ProviderError),
    #[error(transparent)]
    DatabaseError(#[from] SettlementDatabaseError),
    #[error(transparent)]
    LedgerError(#[from] LedgerError),
}
