//! # HNG payment server
//! This crate hosts the HTTP surface over the settlement engine. It is responsible for:
//! Receiving and authenticating payment webhooks from the enabled gateways.
//! Driving checkout: session tokens, order creation, and payment creation through the orchestrator.
//! Serving the PIX charge endpoints the payment-pending page polls.
//! Running the background reconciliation sweep for charges whose webhooks never arrived.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/checkout/session` and `/checkout`: the checkout flow.
//! * `/checkout/intent` and `/checkout/intent/verify`: signed single-use checkout intents.
//! * `/order/{id}` and the `/order/{id}/charge` family: the confirmation and payment-pending pages.
//! * `/webhook/{gateway}`: the staged webhook ingestion pipeline.

pub mod config;
pub mod data_objects;
pub mod errors;

pub mod helpers;
pub mod orchestrator;
pub mod providers;
pub mod rate_limiter;
pub mod reconcile_worker;
pub mod routes;
pub mod server;
pub mod session;
pub mod webhook;

#[cfg(test)]
mod endpoint_tests;
