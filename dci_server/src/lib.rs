//! DCI scheduling engine.
//!
//! Remote CI workers ask for work against a topic; the engine resolves which
//! component versions the job runs against, rotates through the worker's run
//! configurations, tracks the job through its status lifecycle and reaps
//! jobs whose worker vanished.

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod migration;
pub mod models;
pub mod repository;
pub mod routes;
pub mod schema;
pub mod services;

pub use config::DciConfig;
pub use error::{SchedulerError, SchedulerResult};
