//! Application layer containing the payment status orchestration.
//!
//! `PaymentStatusEngine` is the primary entry point. It composes the status
//! resolver and its fallback chain, the auto-reconciler, the multi-order
//! aggregator and the health monitor. `PaymentWatcher` drives polling and
//! realtime refresh for a single order on top of the same components.

pub mod aggregator;
pub mod engine;
pub mod health;
pub mod poll;
pub mod realtime;
pub mod reconciler;
pub mod resolver;
pub mod watcher;
