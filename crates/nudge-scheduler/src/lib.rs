//! Nudge Scheduler crate - periodic reminder delivery.
//!
//! Provides the `DeliveryRunner` background job: scan the store for due
//! reminders on a fixed interval, dispatch each exactly once, and
//! reconcile failures (drop permanently-unreachable recipients, retry
//! transient ones on the next tick).

pub mod runner;

pub use runner::{DeliveryRunner, TickSummary};
