//! Scheduling engine — storage-agnostic business logic.
//!
//! Every operation takes a [`context::Context`] and works against the
//! repository traits only.

pub mod access;
pub mod catalog;
pub mod context;
pub mod job_events;
pub mod job_lifecycle;
pub mod notifier;
pub mod rconfiguration_selector;
pub mod reaper;
pub mod resolver;

pub use context::{Caller, Clock, Context, SchedulePolicy, SystemClock};
pub use notifier::{LogNotifier, Notifier, WebhookNotifier};
