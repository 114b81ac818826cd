//! Application layer orchestrating a charge.
//!
//! `ChargeEngine` is the entry point. It prices an order with the aggregator,
//! reserves the charge through the idempotency guard, calls the provider
//! through the gateway adapter and records the result with the recorder.

pub mod aggregator;
pub mod engine;
pub mod gateway;
pub mod guard;
pub mod recorder;
pub mod retry;
