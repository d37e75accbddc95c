//! component — one versioned artifact of a topic.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ResourceState;
use crate::schema::components;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = components)]
pub struct Component {
    pub id: Uuid,
    pub topic_id: Uuid,
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
    pub export_control: bool,
    /// `None` means the component is visible to every team.
    pub team_id: Option<Uuid>,
    pub state: ResourceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Component {
    pub fn is_active(&self) -> bool {
        self.state == ResourceState::Active
    }
}
