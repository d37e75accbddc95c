//! Job lifecycle — scheduling, status transitions, archive and purge.
//!
//! Scheduling flow for a by-type request:
//!   reaper -> configuration selector -> resolver -> persist job
//!
//! An upgrade schedules the same remoteci on the topic's next release line,
//! chained to the upgraded job through `previous_job_id`.
//!
//! A status transition appends a jobstate, recomputes the duration and, when
//! a running job reaches a reported result, allocates a job event and builds
//! the notification the caller dispatches after commit.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::Context;
use super::{access, rconfiguration_selector, reaper, resolver};
use crate::error::{SchedulerError, SchedulerResult};
use crate::events::{JobNotification, JobSnapshot};
use crate::metrics;
use crate::models::component::Component;
use crate::models::file::JobFile;
use crate::models::job::{Job, JobStatus, JobStatusUpdate};
use crate::models::job_event::{JobEvent, JOB_EVENTS_SEQUENCE};
use crate::models::jobstate::Jobstate;
use crate::models::remoteci::Remoteci;
use crate::models::topic::Topic;
use crate::models::ResourceState;
use crate::repository::Store;

/// Schedule the next job of a remoteci, resolving components by type.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub remoteci_id: Uuid,
    pub topic_id: Uuid,
    #[serde(default)]
    pub previous_job_id: Option<Uuid>,
}

/// Create a job from a caller-chosen component set.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentScheduleRequest {
    pub remoteci_id: Uuid,
    pub topic_id: Uuid,
    pub team_id: Uuid,
    #[serde(rename = "components")]
    pub component_ids: Vec<Uuid>,
    /// Optional types of the topic the caller supplies ids for.
    #[serde(default)]
    pub optional_types: Vec<String>,
    #[serde(default)]
    pub previous_job_id: Option<Uuid>,
}

/// Upgrade an existing job to the next topic.
#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeRequest {
    pub job_id: Uuid,
}

/// Paging of the job listing.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct JobListQuery {
    #[serde(default = "JobListQuery::default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl JobListQuery {
    pub const MAX_LIMIT: i64 = 100;

    fn default_limit() -> i64 {
        Self::MAX_LIMIT
    }
}

impl Default for JobListQuery {
    fn default() -> Self {
        Self {
            limit: Self::MAX_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobList {
    pub jobs: Vec<Job>,
    /// Total matching jobs, ignoring paging.
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJob {
    pub job: Job,
    pub components: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub job: Job,
    /// Set only when the job just reached a reported result.
    pub event: Option<JobEvent>,
    pub notification: Option<JobNotification>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobDetails {
    pub job: Job,
    pub components: Vec<Component>,
    pub jobstates: Vec<Jobstate>,
    pub files: Vec<JobFile>,
}

/// Everything needed to persist a new job once its targets are validated.
struct JobPlan {
    remoteci: Remoteci,
    topic: Topic,
    team_id: Uuid,
    rconfiguration_id: Option<Uuid>,
    previous_job_id: Option<Uuid>,
    types: Vec<String>,
    explicit_ids: Vec<Uuid>,
}

async fn active_remoteci<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    remoteci_id: Uuid,
) -> SchedulerResult<Remoteci> {
    let remoteci = ctx
        .store
        .get_remoteci(remoteci_id)
        .await?
        .ok_or_else(|| SchedulerError::not_found("remoteci", remoteci_id))?;
    if !remoteci.is_active() {
        return Err(SchedulerError::RemoteciInactive(remoteci_id));
    }
    Ok(remoteci)
}

async fn active_topic<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    topic_id: Uuid,
) -> SchedulerResult<Topic> {
    let topic = ctx
        .store
        .get_topic(topic_id)
        .await?
        .ok_or_else(|| SchedulerError::not_found("topic", topic_id))?;
    if !topic.is_active() {
        return Err(SchedulerError::TopicInactive(topic_id));
    }
    Ok(topic)
}

async fn ensure_previous_job<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    previous_job_id: Option<Uuid>,
) -> SchedulerResult<()> {
    if let Some(id) = previous_job_id {
        if ctx.store.get_job(id).await?.is_none() {
            return Err(SchedulerError::not_found("job", id));
        }
    }
    Ok(())
}

/// Active, non-archived job the caller's team may act on.
async fn load_job<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    job_id: Uuid,
) -> SchedulerResult<Job> {
    let job = ctx
        .store
        .get_job(job_id)
        .await?
        .filter(|j| j.state != ResourceState::Archived)
        .ok_or_else(|| SchedulerError::not_found("job", job_id))?;
    if !ctx.caller.belongs_to(job.team_id) {
        return Err(SchedulerError::Unauthorized);
    }
    Ok(job)
}

/// Resolve the component set and persist the job, its first jobstate and
/// its component links.
async fn create_job<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    plan: JobPlan,
) -> SchedulerResult<ScheduledJob> {
    let components =
        resolver::resolve(ctx, plan.topic.id, &plan.types, &plan.explicit_ids).await?;

    let now = ctx.now();
    let job = Job {
        id: Uuid::new_v4(),
        remoteci_id: plan.remoteci.id,
        team_id: plan.team_id,
        topic_id: plan.topic.id,
        product_id: plan.topic.product_id,
        rconfiguration_id: plan.rconfiguration_id,
        previous_job_id: plan.previous_job_id,
        status: JobStatus::New,
        comment: None,
        duration: 0,
        etag: Uuid::new_v4(),
        state: ResourceState::Active,
        created_at: now,
        updated_at: now,
    };
    let job = ctx.store.insert_job(&job).await?;

    ctx.store
        .insert_jobstate(&Jobstate {
            id: Uuid::new_v4(),
            job_id: job.id,
            team_id: job.team_id,
            status: JobStatus::New,
            comment: None,
            created_at: now,
        })
        .await?;
    ctx.store.link_components(job.id, &components).await?;

    tracing::info!(
        job_id = %job.id,
        remoteci_id = %job.remoteci_id,
        topic_id = %job.topic_id,
        rconfiguration_id = ?job.rconfiguration_id,
        components = components.len(),
        "Job scheduled"
    );
    Ok(ScheduledJob { job, components })
}

/// Schedule a job for the remoteci with the newest component of every type.
///
/// Stale jobs of the remoteci on this topic are killed first, then the next
/// run configuration is picked; its type list overrides the topic's.
pub async fn schedule_by_type<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    request: &ScheduleRequest,
) -> SchedulerResult<ScheduledJob> {
    match try_schedule_by_type(ctx, request).await {
        Ok(scheduled) => {
            metrics::job_scheduled("type");
            Ok(scheduled)
        }
        Err(e) => {
            metrics::schedule_failed(e.reason());
            Err(e)
        }
    }
}

async fn try_schedule_by_type<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    request: &ScheduleRequest,
) -> SchedulerResult<ScheduledJob> {
    let remoteci = active_remoteci(ctx, request.remoteci_id).await?;
    if !ctx.caller.belongs_to(remoteci.team_id) {
        return Err(SchedulerError::Unauthorized);
    }
    let topic = active_topic(ctx, request.topic_id).await?;
    access::ensure_topic_access(ctx, &topic, remoteci.team_id).await?;
    ensure_previous_job(ctx, request.previous_job_id).await?;

    let stale_after = ctx.policy.stale_after;
    reaper::kill_stale(ctx, remoteci.id, Some(topic.id), stale_after).await?;

    let rconfiguration = rconfiguration_selector::select_next(ctx, topic.id, remoteci.id).await?;
    let (rconfiguration_id, types) = match rconfiguration {
        Some(rconf) => {
            let types = rconf
                .component_types
                .unwrap_or_else(|| topic.component_types.clone());
            (Some(rconf.id), types)
        }
        None => (None, topic.component_types.clone()),
    };

    let team_id = remoteci.team_id;
    create_job(
        ctx,
        JobPlan {
            remoteci,
            topic,
            team_id,
            rconfiguration_id,
            previous_job_id: request.previous_job_id,
            types,
            explicit_ids: Vec::new(),
        },
    )
    .await
}

/// Create a job from explicit component ids. No reaping happens here.
pub async fn schedule_with_components<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    request: &ComponentScheduleRequest,
) -> SchedulerResult<ScheduledJob> {
    match try_schedule_with_components(ctx, request).await {
        Ok(scheduled) => {
            metrics::job_scheduled("components");
            Ok(scheduled)
        }
        Err(e) => {
            metrics::schedule_failed(e.reason());
            Err(e)
        }
    }
}

async fn try_schedule_with_components<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    request: &ComponentScheduleRequest,
) -> SchedulerResult<ScheduledJob> {
    if !ctx.caller.belongs_to(request.team_id) {
        return Err(SchedulerError::Unauthorized);
    }
    let remoteci = active_remoteci(ctx, request.remoteci_id).await?;
    let topic = active_topic(ctx, request.topic_id).await?;
    access::ensure_topic_access(ctx, &topic, request.team_id).await?;
    ensure_previous_job(ctx, request.previous_job_id).await?;

    if let Some(unknown) = request
        .optional_types
        .iter()
        .find(|t| !topic.is_optional_type(t))
    {
        return Err(SchedulerError::UnknownOptionalType(unknown.clone()));
    }
    let mut types = topic.component_types.clone();
    types.extend(request.optional_types.iter().cloned());

    // An empty selection would silently fall through to by-type resolution.
    if request.component_ids.is_empty() {
        return Err(SchedulerError::CountMismatch { ids: 0, types });
    }

    create_job(
        ctx,
        JobPlan {
            remoteci,
            topic,
            team_id: request.team_id,
            rconfiguration_id: None,
            previous_job_id: request.previous_job_id,
            types,
            explicit_ids: request.component_ids.clone(),
        },
    )
    .await
}

/// Schedule the job's remoteci against the next topic of the job's topic.
///
/// Components are the newest of every type of the next topic; the new job
/// points back at the upgraded one.
pub async fn upgrade_job<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    request: &UpgradeRequest,
) -> SchedulerResult<ScheduledJob> {
    match try_upgrade_job(ctx, request).await {
        Ok(scheduled) => {
            metrics::job_scheduled("upgrade");
            Ok(scheduled)
        }
        Err(e) => {
            metrics::schedule_failed(e.reason());
            Err(e)
        }
    }
}

async fn try_upgrade_job<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    request: &UpgradeRequest,
) -> SchedulerResult<ScheduledJob> {
    let job = load_job(ctx, request.job_id).await?;
    let topic = ctx
        .store
        .get_topic(job.topic_id)
        .await?
        .ok_or_else(|| SchedulerError::not_found("topic", job.topic_id))?;
    let next_topic_id = topic
        .next_topic_id
        .ok_or(SchedulerError::NoNextTopic(topic.id))?;

    let next_topic = active_topic(ctx, next_topic_id).await?;
    let remoteci = active_remoteci(ctx, job.remoteci_id).await?;
    access::ensure_topic_access(ctx, &next_topic, job.team_id).await?;

    tracing::info!(
        job_id = %job.id,
        from_topic = %topic.id,
        to_topic = %next_topic.id,
        "Upgrading job"
    );
    let types = next_topic.component_types.clone();
    create_job(
        ctx,
        JobPlan {
            remoteci,
            topic: next_topic,
            team_id: job.team_id,
            rconfiguration_id: None,
            previous_job_id: Some(job.id),
            types,
            explicit_ids: Vec::new(),
        },
    )
    .await
}

/// Status actually stored for a requested one.
///
/// A failure or error reported before the run started is an infrastructure
/// error, not a test failure. `killed` and `success` are stored as asked.
pub fn recorded_status(current: JobStatus, requested: JobStatus) -> JobStatus {
    match requested {
        JobStatus::Failure | JobStatus::Error if current.is_setup() => JobStatus::Error,
        other => other,
    }
}

/// Whole seconds since creation, saturated to the column range.
fn elapsed_secs(job: &Job, now: chrono::DateTime<chrono::Utc>) -> i32 {
    let secs = (now - job.created_at).num_seconds().max(0);
    i32::try_from(secs).unwrap_or(i32::MAX)
}

/// Move a job to a new status.
///
/// `if_match` is the etag the caller last saw; a stale one fails with
/// `Conflict`. Finality is not enforced here.
pub async fn transition<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    job_id: Uuid,
    requested: JobStatus,
    comment: Option<String>,
    if_match: Uuid,
) -> SchedulerResult<TransitionOutcome> {
    let job = load_job(ctx, job_id).await?;
    if job.etag != if_match {
        return Err(SchedulerError::conflict("job", job_id));
    }

    let previous = job.status;
    let status = recorded_status(previous, requested);
    let now = ctx.now();

    ctx.store
        .insert_jobstate(&Jobstate {
            id: Uuid::new_v4(),
            job_id,
            team_id: job.team_id,
            status,
            comment: comment.clone(),
            created_at: now,
        })
        .await?;

    let update = JobStatusUpdate {
        status,
        comment,
        duration: elapsed_secs(&job, now),
        etag: Uuid::new_v4(),
        updated_at: now,
    };
    let updated = ctx
        .store
        .update_job_status(job_id, if_match, &update)
        .await?
        .ok_or_else(|| SchedulerError::conflict("job", job_id))?;

    metrics::job_status_changed(status.as_str());
    tracing::info!(
        job_id = %job_id,
        from = %previous,
        to = %status,
        requested = %requested,
        duration = updated.duration,
        "Job status changed"
    );

    if previous.is_final() || !status.is_final() {
        return Ok(TransitionOutcome {
            job: updated,
            event: None,
            notification: None,
        });
    }
    metrics::job_duration(updated.duration);
    if !status.is_reported_result() {
        return Ok(TransitionOutcome {
            job: updated,
            event: None,
            notification: None,
        });
    }

    let sequence = ctx.store.next_sequence(JOB_EVENTS_SEQUENCE).await?;
    let event = ctx
        .store
        .insert_job_event(&JobEvent {
            id: sequence,
            job_id,
            topic_id: updated.topic_id,
            status,
            created_at: now,
        })
        .await?;
    metrics::job_event_emitted();

    let snapshot = snapshot(ctx, &updated).await?;
    let notification = JobNotification::JobFinished {
        event_id: event.id,
        status,
        snapshot,
    };

    Ok(TransitionOutcome {
        job: updated,
        event: Some(event),
        notification: Some(notification),
    })
}

async fn snapshot<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    job: &Job,
) -> SchedulerResult<JobSnapshot> {
    Ok(JobSnapshot {
        job: job.clone(),
        components: ctx.store.components_for_job(job.id).await?,
        files: ctx.store.files_for_job(job.id).await?,
        topic: ctx.store.get_topic(job.topic_id).await?,
        remoteci: ctx.store.get_remoteci(job.remoteci_id).await?,
    })
}

/// Archive the job and all of its files. Rows stay until purged.
pub async fn delete_job<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    job_id: Uuid,
    if_match: Uuid,
) -> SchedulerResult<()> {
    let job = load_job(ctx, job_id).await?;
    if job.etag != if_match {
        return Err(SchedulerError::conflict("job", job_id));
    }
    let now = ctx.now();
    if ctx.store.archive_job(job_id, now).await? == 0 {
        return Err(SchedulerError::not_found("job", job_id));
    }
    let files = ctx.store.archive_files_for_job(job_id).await?;
    tracing::info!(job_id = %job_id, files, "Job archived");
    Ok(())
}

/// Hard-delete every archived job. Super admin only.
pub async fn purge_archived_jobs<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
) -> SchedulerResult<u64> {
    if !ctx.caller.super_admin {
        return Err(SchedulerError::Unauthorized);
    }
    let purged = ctx.store.purge_archived_jobs().await?;
    tracing::info!(purged, "Purged archived jobs");
    Ok(purged)
}

/// Non-archived jobs, newest first; team members only see their team's.
pub async fn list_jobs<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    query: JobListQuery,
) -> SchedulerResult<JobList> {
    let team_id = if ctx.caller.super_admin {
        None
    } else {
        Some(ctx.caller.team_id.ok_or(SchedulerError::Unauthorized)?)
    };
    let limit = query.limit.clamp(1, JobListQuery::MAX_LIMIT);
    let offset = query.offset.max(0);
    let jobs = ctx.store.list_jobs(team_id, limit, offset).await?;
    let count = ctx.store.count_jobs(team_id).await?;
    Ok(JobList { jobs, count })
}

pub async fn get_job<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    job_id: Uuid,
) -> SchedulerResult<JobDetails> {
    let job = load_job(ctx, job_id).await?;
    let components = ctx.store.components_for_job(job_id).await?;
    let jobstates = list_jobstates(ctx, job_id).await?;
    let files = ctx.store.files_for_job(job_id).await?;
    Ok(JobDetails {
        job,
        components,
        jobstates,
        files,
    })
}

/// Jobstates of a job, oldest first.
pub async fn list_jobstates<S: Store + ?Sized>(
    ctx: &mut Context<'_, S>,
    job_id: Uuid,
) -> SchedulerResult<Vec<Jobstate>> {
    load_job(ctx, job_id).await?;
    let mut jobstates = ctx.store.jobstates_for_job(job_id).await?;
    jobstates.sort_by_key(|s| s.created_at);
    Ok(jobstates)
}
