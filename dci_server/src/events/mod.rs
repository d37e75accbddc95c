//! Outbound notifications produced by the scheduling engine.
//!
//! The engine only decides that something happened and what it carries.
//! Delivery is left to a `Notifier` and happens after commit.

pub mod job;

pub use job::{JobNotification, JobSnapshot};
