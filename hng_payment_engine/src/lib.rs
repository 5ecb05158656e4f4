//! HNG Payment Engine
//!
//! The settlement core for the HNG commerce platform: order creation from carts, the tiered fee calculator, the
//! order lifecycle state machine, the PIX charge state machine, and the idempotent application of payment events
//! against it all. The engine is HTTP-free and provider-agnostic; the server crate supplies the webhook surface and
//! concrete gateway adapters.
//!
//! The library is divided into three main sections:
//! 1. Storage ([`mod@sqlite`] and the contracts in [`mod@traits`]). You should never need to touch the database
//!    directly; use the APIs. The exception is the record types themselves, which are public in [`mod@db_types`].
//! 2. The settlement API ([`mod@order_flow`] and [`mod@fees`]): `OrderFlowApi`, `ChargeApi` and `FeeApi`.
//! 3. Events ([`mod@events`]): a small actor-style pub/sub layer through which listeners (stock, e-mail, ledger)
//!    react to settlement outcomes without the engine knowing about them.
pub mod db_types;
pub mod events;
pub mod fees;
pub mod helpers;
pub mod order_flow;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use order_flow::{ChargeApi, ChargeError, FeeApi, OrderFlowApi, OrderFlowError};
