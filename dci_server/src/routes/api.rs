//! Transactional entry points into the scheduling engine.
//!
//! Each function checks out one pooled connection, runs one engine
//! operation inside a single transaction and, for status transitions,
//! dispatches the notification once the transaction has committed.

use diesel_async::pooled_connection::deadpool::Object;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::job::{Job, JobStatus};
use crate::models::job_event::{Counter, JobEvent};
use crate::models::jobstate::Jobstate;
use crate::repository::PgStore;
use crate::services::job_lifecycle::{
    self, ComponentScheduleRequest, JobDetails, JobList, JobListQuery, ScheduleRequest,
    ScheduledJob, UpgradeRequest,
};
use crate::services::{job_events, notifier, Caller, Context};

/// Body of a status report.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: JobStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

async fn connection(state: &AppState) -> SchedulerResult<Object<AsyncPgConnection>> {
    state.pool.get().await.map_err(|e| {
        tracing::error!("Connection pool error: {e}");
        SchedulerError::Pool(e.to_string())
    })
}

pub async fn schedule_by_type(
    state: &AppState,
    caller: &Caller,
    request: ScheduleRequest,
) -> SchedulerResult<ScheduledJob> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_lifecycle::schedule_by_type(&mut ctx, &request).await
        }
        .scope_boxed()
    })
    .await
}

pub async fn schedule_with_components(
    state: &AppState,
    caller: &Caller,
    request: ComponentScheduleRequest,
) -> SchedulerResult<ScheduledJob> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_lifecycle::schedule_with_components(&mut ctx, &request).await
        }
        .scope_boxed()
    })
    .await
}

pub async fn upgrade_job(
    state: &AppState,
    caller: &Caller,
    request: UpgradeRequest,
) -> SchedulerResult<ScheduledJob> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_lifecycle::upgrade_job(&mut ctx, &request).await
        }
        .scope_boxed()
    })
    .await
}

pub async fn list_jobs(
    state: &AppState,
    caller: &Caller,
    query: JobListQuery,
) -> SchedulerResult<JobList> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_lifecycle::list_jobs(&mut ctx, query).await
        }
        .scope_boxed()
    })
    .await
}

/// Apply a status report; the notification, if any, leaves after commit.
pub async fn update_status(
    state: &AppState,
    caller: &Caller,
    job_id: Uuid,
    if_match: Uuid,
    request: StatusUpdateRequest,
) -> SchedulerResult<Job> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    let outcome = conn
        .transaction::<_, SchedulerError, _>(|conn| {
            async move {
                let mut store = PgStore::new(conn);
                let mut ctx = Context::new(caller, &mut store, clock, policy);
                job_lifecycle::transition(
                    &mut ctx,
                    job_id,
                    request.status,
                    request.comment,
                    if_match,
                )
                .await
            }
            .scope_boxed()
        })
        .await?;

    if let Some(notification) = outcome.notification {
        notifier::dispatch(state.notifier.clone(), notification);
    }
    Ok(outcome.job)
}

pub async fn get_job(
    state: &AppState,
    caller: &Caller,
    job_id: Uuid,
) -> SchedulerResult<JobDetails> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_lifecycle::get_job(&mut ctx, job_id).await
        }
        .scope_boxed()
    })
    .await
}

pub async fn list_jobstates(
    state: &AppState,
    caller: &Caller,
    job_id: Uuid,
) -> SchedulerResult<Vec<Jobstate>> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_lifecycle::list_jobstates(&mut ctx, job_id).await
        }
        .scope_boxed()
    })
    .await
}

pub async fn delete_job(
    state: &AppState,
    caller: &Caller,
    job_id: Uuid,
    if_match: Uuid,
) -> SchedulerResult<()> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_lifecycle::delete_job(&mut ctx, job_id, if_match).await
        }
        .scope_boxed()
    })
    .await
}

pub async fn purge_archived_jobs(state: &AppState, caller: &Caller) -> SchedulerResult<u64> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_lifecycle::purge_archived_jobs(&mut ctx).await
        }
        .scope_boxed()
    })
    .await
}

pub async fn list_job_events(
    state: &AppState,
    caller: &Caller,
    sequence: i64,
    limit: Option<i64>,
) -> SchedulerResult<Vec<JobEvent>> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_events::list_job_events(&mut ctx, sequence, limit).await
        }
        .scope_boxed()
    })
    .await
}

pub async fn purge_job_events(
    state: &AppState,
    caller: &Caller,
    sequence: i64,
) -> SchedulerResult<u64> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_events::purge_job_events(&mut ctx, sequence).await
        }
        .scope_boxed()
    })
    .await
}

pub async fn current_sequence(state: &AppState, caller: &Caller) -> SchedulerResult<Counter> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_events::current_sequence(&mut ctx).await
        }
        .scope_boxed()
    })
    .await
}

pub async fn update_sequence(
    state: &AppState,
    caller: &Caller,
    sequence: i64,
    if_match: Uuid,
) -> SchedulerResult<Counter> {
    let mut conn = connection(state).await?;
    let clock = state.clock.as_ref();
    let policy = &state.policy;
    conn.transaction::<_, SchedulerError, _>(|conn| {
        async move {
            let mut store = PgStore::new(conn);
            let mut ctx = Context::new(caller, &mut store, clock, policy);
            job_events::update_sequence(&mut ctx, sequence, if_match).await
        }
        .scope_boxed()
    })
    .await
}
