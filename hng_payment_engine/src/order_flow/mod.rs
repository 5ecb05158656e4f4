//! The settlement flows.
//!
//! [`OrderFlowApi`] owns the order lifecycle: checkout, the status state machine, and the single transition function
//! that both webhook and poll events funnel through. [`ChargeApi`] owns the PIX charge state machine on top of a
//! [`crate::traits::PaymentProvider`]. [`FeeApi`] glues the fee calculator to the store's GMV and the cached remote
//! tier schedule.
mod charge_api;
mod errors;
mod fee_api;
mod objects;
mod order_flow_api;

pub use charge_api::{ChargeApi, DEFAULT_CHARGE_LIFETIME, DEFAULT_STALENESS_THRESHOLD};
pub use errors::{ChargeError, OrderFlowError};
pub use fee_api::FeeApi;
pub use objects::{ChargePoll, CheckoutOutcome, CheckoutRequest, SettlementOutcome};
pub use order_flow_api::OrderFlowApi;
