//! rconfiguration — named component-type override for a (remoteci, topic) pair.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ResourceState;
use crate::schema::rconfigurations;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = rconfigurations)]
pub struct RConfiguration {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub name: String,
    /// `None` falls back to the topic's component types.
    pub component_types: Option<Vec<String>>,
    pub state: ResourceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
