//! job — one scheduled run of a remoteci against a resolved component set.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ResourceState;
use crate::schema::{jobs, jobs_components};

/// Status of a job. Stored as its kebab-case name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    diesel::AsExpression,
    diesel::FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    New,
    PreRun,
    Running,
    PostRun,
    Success,
    Failure,
    Killed,
    Error,
}

impl JobStatus {
    /// Statuses the reaper considers abandoned once they are old enough.
    pub const ACTIVE: [JobStatus; 4] = [
        JobStatus::New,
        JobStatus::PreRun,
        JobStatus::Running,
        JobStatus::PostRun,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::PreRun => "pre-run",
            JobStatus::Running => "running",
            JobStatus::PostRun => "post-run",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Killed => "killed",
            JobStatus::Error => "error",
        }
    }

    /// No further work is expected for the job.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failure | JobStatus::Error | JobStatus::Killed
        )
    }

    /// A result the worker reported; entering one of these emits a job event.
    pub fn is_reported_result(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failure | JobStatus::Error
        )
    }

    /// The run has not started executing tests yet.
    pub fn is_setup(&self) -> bool {
        matches!(self, JobStatus::New | JobStatus::PreRun)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(JobStatus::New),
            "pre-run" => Ok(JobStatus::PreRun),
            "running" => Ok(JobStatus::Running),
            "post-run" => Ok(JobStatus::PostRun),
            "success" => Ok(JobStatus::Success),
            "failure" => Ok(JobStatus::Failure),
            "killed" => Ok(JobStatus::Killed),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

impl ToSql<Text, Pg> for JobStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for JobStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        raw.parse().map_err(Into::into)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub remoteci_id: Uuid,
    pub team_id: Uuid,
    pub topic_id: Uuid,
    pub product_id: Option<Uuid>,
    pub rconfiguration_id: Option<Uuid>,
    pub previous_job_id: Option<Uuid>,
    pub status: JobStatus,
    pub comment: Option<String>,
    /// Seconds elapsed between creation and the last status change.
    pub duration: i32,
    /// Optimistic-concurrency token, rotated on every write.
    pub etag: Uuid,
    pub state: ResourceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written by a status transition.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = jobs)]
pub struct JobStatusUpdate {
    pub status: JobStatus,
    pub comment: Option<String>,
    pub duration: i32,
    pub etag: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Link between a job and one of its resolved components.
#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = jobs_components)]
pub struct JobComponent {
    pub job_id: Uuid,
    pub component_id: Uuid,
    pub position: i32,
}
