//! file — metadata of a result file uploaded for a job.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ResourceState;
use crate::schema::files;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = files)]
pub struct JobFile {
    pub id: Uuid,
    pub job_id: Uuid,
    pub name: String,
    pub mime: Option<String>,
    pub size: Option<i64>,
    pub state: ResourceState,
    pub created_at: DateTime<Utc>,
}
