//! # Storage and collaborator seams.
//!
//! This module defines the interface contracts between the settlement engine and the things it cannot own: the
//! relational store, the bookkeeping ledger, and the external payment providers.
//!
//! ## Traits
//! * [`SettlementDatabase`] is the storage backend contract: orders, items, notes, transactions, charges and
//!   idempotency markers. The relational store is the single source of truth; everything durable goes through here.
//! * [`Ledger`] is the bookkeeping collaborator. The engine only records the entries the charge manager and the
//!   reconciliation sweep need; double-entry accounting lives on the other side of this trait.
//! * [`PaymentProvider`] is the adapter seam for PIX-capable gateways. The charge state machine is written against
//!   this trait, so swapping providers requires no change to it.
//!
//! The remote fee-tier override seam, [`crate::fees::TierSource`], lives with the fee calculator.
mod data_objects;
mod ledger;
mod payment_provider;
mod settlement_database;

pub use data_objects::{ChargeRequest, OrderQueryFilter, ProviderCharge};
pub use ledger::{Ledger, LedgerError};
pub use payment_provider::{PaymentProvider, ProviderError};
pub use settlement_database::{SettlementDatabase, SettlementDatabaseError};

/// Bound alias for backends that both store settlement data and keep the ledger. Blanket-implemented, so any
/// `SettlementDatabase + Ledger` type qualifies automatically.
pub trait SettlementBackend: SettlementDatabase + Ledger {}

impl<T: SettlementDatabase + Ledger> SettlementBackend for T {}
