//! Cursor-based consumption of job events. Super admin only.
//!
//! The consumer keeps its position in the `jobs_events` counter, created at
//! zero on first read and moved forward under an etag.

use uuid::Uuid;

use super::context::Context;
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::job_event::{Counter, JobEvent, JOB_EVENTS_COUNTER};
use crate::repository::Store;

/// Upper bound on a single page of events.
pub const MAX_EVENTS_PAGE: i64 = 1000;

fn ensure_super_admin<S: Store + ?Sized>(ctx: &Context<'_, S>) -> SchedulerResult<()> {
    if ctx.caller.super_admin {
        Ok(())
    } else {
        Err(SchedulerError::Unauthorized)
    }
}

/// Events with an id greater than or equal to `sequence`, oldest first.
pub async fn list_job_events<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    sequence: i64,
    limit: Option<i64>,
) -> SchedulerResult<Vec<JobEvent>> {
    ensure_super_admin(ctx)?;
    let limit = limit.unwrap_or(MAX_EVENTS_PAGE).clamp(1, MAX_EVENTS_PAGE);
    ctx.store.job_events_from(sequence, limit).await
}

/// Drop every event from `sequence` onwards once a consumer has them.
pub async fn purge_job_events<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    sequence: i64,
) -> SchedulerResult<u64> {
    ensure_super_admin(ctx)?;
    let purged = ctx.store.purge_job_events_from(sequence).await?;
    tracing::info!(sequence, purged, "Purged job events");
    Ok(purged)
}

/// The consumer cursor, created at zero if nobody read it before.
pub async fn current_sequence<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
) -> SchedulerResult<Counter> {
    ensure_super_admin(ctx)?;
    if let Some(counter) = ctx.store.get_counter(JOB_EVENTS_COUNTER).await? {
        return Ok(counter);
    }
    ctx.store
        .create_counter(&Counter {
            name: JOB_EVENTS_COUNTER.to_string(),
            sequence: 0,
            etag: Uuid::new_v4(),
        })
        .await?;
    ctx.store
        .get_counter(JOB_EVENTS_COUNTER)
        .await?
        .ok_or_else(|| SchedulerError::not_found("counter", JOB_EVENTS_COUNTER))
}

/// Move the consumer cursor. A stale `if_match` is a `Conflict`.
pub async fn update_sequence<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    sequence: i64,
    if_match: Uuid,
) -> SchedulerResult<Counter> {
    ensure_super_admin(ctx)?;
    let etag = Uuid::new_v4();
    if !ctx
        .store
        .update_counter(JOB_EVENTS_COUNTER, if_match, sequence, etag)
        .await?
    {
        return Err(SchedulerError::conflict("counter", JOB_EVENTS_COUNTER));
    }
    tracing::info!(sequence, "Job events cursor moved");
    Ok(Counter {
        name: JOB_EVENTS_COUNTER.to_string(),
        sequence,
        etag,
    })
}
