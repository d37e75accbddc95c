//! Self-healing cleanup of jobs a remoteci abandoned.

use chrono::Duration;
use uuid::Uuid;

use super::context::Context;
use crate::error::SchedulerResult;
use crate::metrics;
use crate::repository::Store;

/// Kill every non-final job of the remoteci created more than `older_than`
/// ago, optionally restricted to one topic.
///
/// Runs as one predicate update. No job event is emitted for reaped jobs.
pub async fn kill_stale<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    remoteci_id: Uuid,
    topic_id: Option<Uuid>,
    older_than: Duration,
) -> SchedulerResult<u64> {
    let cutoff = ctx.now() - older_than;
    let killed = ctx
        .store
        .kill_stale_jobs(remoteci_id, topic_id, cutoff)
        .await?;

    if killed > 0 {
        tracing::info!(
            remoteci_id = %remoteci_id,
            topic_id = ?topic_id,
            killed,
            cutoff = %cutoff,
            "Killed stale jobs"
        );
        metrics::jobs_killed(killed);
    }
    Ok(killed)
}
