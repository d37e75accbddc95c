//! topic — a release line grouping component versions.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ResourceState;
use crate::schema::topics;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = topics)]
pub struct Topic {
    pub id: Uuid,
    pub name: String,
    pub product_id: Option<Uuid>,
    /// Mandatory component types, in scheduling order.
    pub component_types: Vec<String>,
    pub optional_component_types: Vec<String>,
    pub export_control: bool,
    /// Release line jobs on this topic upgrade to.
    pub next_topic_id: Option<Uuid>,
    pub state: ResourceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Topic {
    pub fn is_active(&self) -> bool {
        self.state == ResourceState::Active
    }

    pub fn is_optional_type(&self, component_type: &str) -> bool {
        self.optional_component_types
            .iter()
            .any(|t| t == component_type)
    }
}
