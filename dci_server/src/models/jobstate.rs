//! jobstate — append-only record of one status a job held.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::JobStatus;
use crate::schema::jobstates;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = jobstates)]
pub struct Jobstate {
    pub id: Uuid,
    pub job_id: Uuid,
    pub team_id: Uuid,
    pub status: JobStatus,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
