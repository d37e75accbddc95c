//! Persistence contract used by the scheduling engine.
//!
//! Every method takes `&mut self`: an implementation is a handle scoped to
//! one transaction, so a whole engine operation commits or rolls back as
//! a unit. Collections are returned as plain rows; nothing is lazily
//! loaded behind the caller's back.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::SchedulerResult;
use crate::models::component::Component;
use crate::models::file::JobFile;
use crate::models::job::{Job, JobStatusUpdate};
use crate::models::job_event::{Counter, JobEvent};
use crate::models::jobstate::Jobstate;
use crate::models::rconfiguration::RConfiguration;
use crate::models::remoteci::Remoteci;
use crate::models::topic::Topic;

pub use postgres::PgStore;

#[async_trait]
pub trait TopicRepository: Send {
    async fn get_topic(&mut self, topic_id: Uuid) -> SchedulerResult<Option<Topic>>;

    /// Whether the team was explicitly granted access to the topic.
    async fn team_has_grant(&mut self, topic_id: Uuid, team_id: Uuid) -> SchedulerResult<bool>;
}

#[async_trait]
pub trait RemoteciRepository: Send {
    async fn get_remoteci(&mut self, remoteci_id: Uuid) -> SchedulerResult<Option<Remoteci>>;
}

#[async_trait]
pub trait ComponentRepository: Send {
    /// Newest active, globally visible component of a type in a topic.
    async fn latest_active_component(
        &mut self,
        topic_id: Uuid,
        component_type: &str,
        export_control_required: bool,
    ) -> SchedulerResult<Option<Component>>;

    async fn get_component(&mut self, component_id: Uuid) -> SchedulerResult<Option<Component>>;

    /// Components linked to a job, in the order they were resolved.
    async fn components_for_job(&mut self, job_id: Uuid) -> SchedulerResult<Vec<Component>>;
}

#[async_trait]
pub trait RConfigurationRepository: Send {
    /// Non-archived configurations attached to the remoteci for the topic.
    async fn rconfigurations_for_remoteci(
        &mut self,
        remoteci_id: Uuid,
        topic_id: Uuid,
    ) -> SchedulerResult<Vec<RConfiguration>>;
}

#[async_trait]
pub trait JobRepository: Send {
    async fn insert_job(&mut self, job: &Job) -> SchedulerResult<Job>;

    async fn get_job(&mut self, job_id: Uuid) -> SchedulerResult<Option<Job>>;

    /// Non-archived jobs, newest first. `None` lists every team's jobs.
    async fn list_jobs(
        &mut self,
        team_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> SchedulerResult<Vec<Job>>;

    async fn count_jobs(&mut self, team_id: Option<Uuid>) -> SchedulerResult<i64>;

    /// `rconfiguration_id` of the most recently created job for the pair.
    async fn last_rconfiguration_id(
        &mut self,
        topic_id: Uuid,
        remoteci_id: Uuid,
    ) -> SchedulerResult<Option<Uuid>>;

    async fn link_components(&mut self, job_id: Uuid, component_ids: &[Uuid])
        -> SchedulerResult<()>;

    /// Applies the update only if the stored etag still equals `expected_etag`.
    /// Returns `None` when the token is stale.
    async fn update_job_status(
        &mut self,
        job_id: Uuid,
        expected_etag: Uuid,
        update: &JobStatusUpdate,
    ) -> SchedulerResult<Option<Job>>;

    /// Single predicate update moving every abandoned job of the remoteci to
    /// `killed`. Returns the number of rows touched.
    async fn kill_stale_jobs(
        &mut self,
        remoteci_id: Uuid,
        topic_id: Option<Uuid>,
        created_before: DateTime<Utc>,
    ) -> SchedulerResult<u64>;

    async fn archive_job(&mut self, job_id: Uuid, now: DateTime<Utc>) -> SchedulerResult<u64>;

    /// Hard-deletes archived jobs together with everything they own.
    async fn purge_archived_jobs(&mut self) -> SchedulerResult<u64>;
}

#[async_trait]
pub trait JobstateRepository: Send {
    async fn insert_jobstate(&mut self, jobstate: &Jobstate) -> SchedulerResult<Jobstate>;

    async fn jobstates_for_job(&mut self, job_id: Uuid) -> SchedulerResult<Vec<Jobstate>>;
}

#[async_trait]
pub trait JobEventRepository: Send {
    async fn insert_job_event(&mut self, event: &JobEvent) -> SchedulerResult<JobEvent>;

    async fn job_events_from(&mut self, sequence: i64, limit: i64)
        -> SchedulerResult<Vec<JobEvent>>;

    async fn purge_job_events_from(&mut self, sequence: i64) -> SchedulerResult<u64>;
}

#[async_trait]
pub trait FileRepository: Send {
    async fn files_for_job(&mut self, job_id: Uuid) -> SchedulerResult<Vec<JobFile>>;

    async fn archive_files_for_job(&mut self, job_id: Uuid) -> SchedulerResult<u64>;
}

/// Monotonic named counters.
#[async_trait]
pub trait SequenceAllocator: Send {
    async fn next_sequence(&mut self, kind: &str) -> SchedulerResult<i64>;
}

/// Client-owned cursors, updated under an etag.
#[async_trait]
pub trait CounterRepository: Send {
    async fn get_counter(&mut self, name: &str) -> SchedulerResult<Option<Counter>>;

    /// Inserts the counter unless one with the same name already exists.
    async fn create_counter(&mut self, counter: &Counter) -> SchedulerResult<()>;

    /// Returns `false` when `expected_etag` is stale.
    async fn update_counter(
        &mut self,
        name: &str,
        expected_etag: Uuid,
        sequence: i64,
        etag: Uuid,
    ) -> SchedulerResult<bool>;
}

/// Everything the engine needs from storage.
pub trait Store:
    TopicRepository
    + RemoteciRepository
    + ComponentRepository
    + RConfigurationRepository
    + JobRepository
    + JobstateRepository
    + JobEventRepository
    + FileRepository
    + SequenceAllocator
    + CounterRepository
{
}

impl<T> Store for T where
    T: TopicRepository
        + RemoteciRepository
        + ComponentRepository
        + RConfigurationRepository
        + JobRepository
        + JobstateRepository
        + JobEventRepository
        + FileRepository
        + SequenceAllocator
        + CounterRepository
{
}
