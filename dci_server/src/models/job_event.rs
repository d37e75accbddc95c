//! jobs_events — sequenced record of a job reaching a reported result.
//!
//! Consumers poll with a cursor on `id`, which is allocated from the
//! `jobs_events` sequence and never reused. The consumer's own position is
//! kept server-side in the `jobs_events` counter.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::JobStatus;
use crate::schema::{counters, jobs_events};

/// Sequence name used when allocating job event ids.
pub const JOB_EVENTS_SEQUENCE: &str = "jobs_events";

/// Counter holding the consumer cursor over job events.
pub const JOB_EVENTS_COUNTER: &str = "jobs_events";

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = jobs_events)]
pub struct JobEvent {
    pub id: i64,
    pub job_id: Uuid,
    pub topic_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// Named cursor with an etag guarding concurrent updates.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = counters)]
pub struct Counter {
    pub name: String,
    pub sequence: i64,
    pub etag: Uuid,
}
