//! Domain-level authorization: may a team schedule against a topic?

use uuid::Uuid;

use super::context::Context;
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::topic::Topic;
use crate::repository::Store;

/// Export-controlled topics are open to every partner team; the others
/// need an explicit grant. Super admins bypass both.
pub async fn ensure_topic_access<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    topic: &Topic,
    team_id: Uuid,
) -> SchedulerResult<()> {
    if ctx.caller.super_admin || topic.export_control {
        return Ok(());
    }
    if ctx.store.team_has_grant(topic.id, team_id).await? {
        return Ok(());
    }
    tracing::debug!(topic_id = %topic.id, team_id = %team_id, "Topic access denied");
    Err(SchedulerError::Unauthorized)
}
