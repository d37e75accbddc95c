//! remoteci — a registered CI worker identity.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ResourceState;
use crate::schema::remotecis;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = remotecis)]
pub struct Remoteci {
    pub id: Uuid,
    pub name: String,
    pub team_id: Uuid,
    pub state: ResourceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Remoteci {
    pub fn is_active(&self) -> bool {
        self.state == ResourceState::Active
    }
}
