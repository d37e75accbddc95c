//! Scheduling engine data models — plain rows, no lazy relations.

pub mod component;
pub mod file;
pub mod job;
pub mod job_event;
pub mod jobstate;
pub mod rconfiguration;
pub mod remoteci;
pub mod topic;

use std::fmt;
use std::str::FromStr;

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};

/// Lifecycle state shared by every catalog entity.
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
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Active,
    Inactive,
    Archived,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Active => "active",
            ResourceState::Inactive => "inactive",
            ResourceState::Archived => "archived",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ResourceState::Active),
            "inactive" => Ok(ResourceState::Inactive),
            "archived" => Ok(ResourceState::Archived),
            other => Err(format!("unknown resource state: {other}")),
        }
    }
}

impl ToSql<Text, Pg> for ResourceState {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for ResourceState {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        raw.parse().map_err(Into::into)
    }
}
