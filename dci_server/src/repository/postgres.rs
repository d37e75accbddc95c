//! Postgres-backed store over a transaction-scoped async connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::{QueryFragment, QueryId};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use super::{
    ComponentRepository, CounterRepository, FileRepository, JobEventRepository, JobRepository,
    JobstateRepository, RConfigurationRepository, RemoteciRepository, SequenceAllocator,
    TopicRepository,
};
use crate::error::SchedulerResult;
use crate::models::component::Component;
use crate::models::file::JobFile;
use crate::models::job::{Job, JobComponent, JobStatus, JobStatusUpdate};
use crate::models::job_event::{Counter, JobEvent};
use crate::models::jobstate::Jobstate;
use crate::models::rconfiguration::RConfiguration;
use crate::models::remoteci::Remoteci;
use crate::models::topic::Topic;
use crate::models::ResourceState;
use crate::schema::{
    components, counters, files, jobs, jobs_components, jobs_events, jobstates,
    rconfigurations, remotecis, remotecis_rconfigurations, sequences, topics, topics_teams,
};

/// Store handle borrowing a connection, usually inside an open transaction.
pub struct PgStore<'c> {
    conn: &'c mut AsyncPgConnection,
}

impl<'c> PgStore<'c> {
    pub fn new(conn: &'c mut AsyncPgConnection) -> Self {
        Self { conn }
    }
}

/// One `UPDATE` moving the remoteci's abandoned jobs to `killed`.
fn kill_stale_statement(
    remoteci_id: Uuid,
    topic_id: Option<Uuid>,
    created_before: DateTime<Utc>,
) -> impl QueryFragment<Pg> + QueryId + Send + 'static {
    let mut statement = diesel::update(jobs::table)
        .set(jobs::status.eq(JobStatus::Killed))
        .into_boxed::<Pg>()
        .filter(jobs::remoteci_id.eq(remoteci_id))
        .filter(jobs::status.eq_any(JobStatus::ACTIVE))
        .filter(jobs::created_at.lt(created_before));
    if let Some(topic_id) = topic_id {
        statement = statement.filter(jobs::topic_id.eq(topic_id));
    }
    statement
}

/// Compare-and-set of a counter on its etag.
fn counter_update_statement(
    name: &str,
    expected_etag: Uuid,
    sequence: i64,
    etag: Uuid,
) -> impl QueryFragment<Pg> + QueryId + Send + 'static {
    diesel::update(
        counters::table
            .filter(counters::name.eq(name.to_string()))
            .filter(counters::etag.eq(expected_etag)),
    )
    .set((counters::sequence.eq(sequence), counters::etag.eq(etag)))
}

#[async_trait]
impl TopicRepository for PgStore<'_> {
    async fn get_topic(&mut self, topic_id: Uuid) -> SchedulerResult<Option<Topic>> {
        let topic = topics::table
            .find(topic_id)
            .select(Topic::as_select())
            .first(self.conn)
            .await
            .optional()?;
        Ok(topic)
    }

    async fn team_has_grant(&mut self, topic_id: Uuid, team_id: Uuid) -> SchedulerResult<bool> {
        let granted = diesel::select(diesel::dsl::exists(
            topics_teams::table
                .filter(topics_teams::topic_id.eq(topic_id))
                .filter(topics_teams::team_id.eq(team_id)),
        ))
        .get_result::<bool>(self.conn)
        .await?;
        Ok(granted)
    }
}

#[async_trait]
impl RemoteciRepository for PgStore<'_> {
    async fn get_remoteci(&mut self, remoteci_id: Uuid) -> SchedulerResult<Option<Remoteci>> {
        let remoteci = remotecis::table
            .find(remoteci_id)
            .select(Remoteci::as_select())
            .first(self.conn)
            .await
            .optional()?;
        Ok(remoteci)
    }
}

#[async_trait]
impl ComponentRepository for PgStore<'_> {
    async fn latest_active_component(
        &mut self,
        topic_id: Uuid,
        component_type: &str,
        export_control_required: bool,
    ) -> SchedulerResult<Option<Component>> {
        let mut query = components::table
            .filter(components::topic_id.eq(topic_id))
            .filter(components::type_.eq(component_type))
            .filter(components::state.eq(ResourceState::Active))
            .filter(components::team_id.is_null())
            .into_boxed();

        if export_control_required {
            query = query.filter(components::export_control.eq(true));
        }

        let component = query
            .order(components::created_at.desc())
            .select(Component::as_select())
            .first(self.conn)
            .await
            .optional()?;
        Ok(component)
    }

    async fn get_component(&mut self, component_id: Uuid) -> SchedulerResult<Option<Component>> {
        let component = components::table
            .find(component_id)
            .select(Component::as_select())
            .first(self.conn)
            .await
            .optional()?;
        Ok(component)
    }

    async fn components_for_job(&mut self, job_id: Uuid) -> SchedulerResult<Vec<Component>> {
        let results = components::table
            .inner_join(jobs_components::table)
            .filter(jobs_components::job_id.eq(job_id))
            .order(jobs_components::position.asc())
            .select(Component::as_select())
            .load(self.conn)
            .await?;
        Ok(results)
    }
}

#[async_trait]
impl RConfigurationRepository for PgStore<'_> {
    async fn rconfigurations_for_remoteci(
        &mut self,
        remoteci_id: Uuid,
        topic_id: Uuid,
    ) -> SchedulerResult<Vec<RConfiguration>> {
        let results = rconfigurations::table
            .inner_join(remotecis_rconfigurations::table)
            .filter(remotecis_rconfigurations::remoteci_id.eq(remoteci_id))
            .filter(rconfigurations::topic_id.eq(topic_id))
            .filter(rconfigurations::state.ne(ResourceState::Archived))
            .order((rconfigurations::created_at.desc(), rconfigurations::name.asc()))
            .select(RConfiguration::as_select())
            .load(self.conn)
            .await?;
        Ok(results)
    }
}

#[async_trait]
impl JobRepository for PgStore<'_> {
    async fn insert_job(&mut self, job: &Job) -> SchedulerResult<Job> {
        let result = diesel::insert_into(jobs::table)
            .values(job)
            .returning(Job::as_returning())
            .get_result(self.conn)
            .await?;
        Ok(result)
    }

    async fn get_job(&mut self, job_id: Uuid) -> SchedulerResult<Option<Job>> {
        let job = jobs::table
            .find(job_id)
            .select(Job::as_select())
            .first(self.conn)
            .await
            .optional()?;
        Ok(job)
    }

    async fn list_jobs(
        &mut self,
        team_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> SchedulerResult<Vec<Job>> {
        let mut query = jobs::table
            .filter(jobs::state.ne(ResourceState::Archived))
            .into_boxed();
        if let Some(team_id) = team_id {
            query = query.filter(jobs::team_id.eq(team_id));
        }
        let results = query
            .order((jobs::created_at.desc(), jobs::id.asc()))
            .limit(limit)
            .offset(offset)
            .select(Job::as_select())
            .load(self.conn)
            .await?;
        Ok(results)
    }

    async fn count_jobs(&mut self, team_id: Option<Uuid>) -> SchedulerResult<i64> {
        let mut query = jobs::table
            .filter(jobs::state.ne(ResourceState::Archived))
            .into_boxed();
        if let Some(team_id) = team_id {
            query = query.filter(jobs::team_id.eq(team_id));
        }
        let count = query.count().get_result::<i64>(self.conn).await?;
        Ok(count)
    }

    async fn last_rconfiguration_id(
        &mut self,
        topic_id: Uuid,
        remoteci_id: Uuid,
    ) -> SchedulerResult<Option<Uuid>> {
        let last = jobs::table
            .filter(jobs::topic_id.eq(topic_id))
            .filter(jobs::remoteci_id.eq(remoteci_id))
            .order(jobs::created_at.desc())
            .select(jobs::rconfiguration_id)
            .first::<Option<Uuid>>(self.conn)
            .await
            .optional()?;
        Ok(last.flatten())
    }

    async fn link_components(
        &mut self,
        job_id: Uuid,
        component_ids: &[Uuid],
    ) -> SchedulerResult<()> {
        let links: Vec<JobComponent> = component_ids
            .iter()
            .enumerate()
            .map(|(position, component_id)| JobComponent {
                job_id,
                component_id: *component_id,
                position: position as i32,
            })
            .collect();

        diesel::insert_into(jobs_components::table)
            .values(&links)
            .execute(self.conn)
            .await?;
        Ok(())
    }

    async fn update_job_status(
        &mut self,
        job_id: Uuid,
        expected_etag: Uuid,
        update: &JobStatusUpdate,
    ) -> SchedulerResult<Option<Job>> {
        let job = diesel::update(
            jobs::table
                .filter(jobs::id.eq(job_id))
                .filter(jobs::etag.eq(expected_etag)),
        )
        .set(update)
        .returning(Job::as_returning())
        .get_result(self.conn)
        .await
        .optional()?;
        Ok(job)
    }

    async fn kill_stale_jobs(
        &mut self,
        remoteci_id: Uuid,
        topic_id: Option<Uuid>,
        created_before: DateTime<Utc>,
    ) -> SchedulerResult<u64> {
        let killed = kill_stale_statement(remoteci_id, topic_id, created_before)
            .execute(self.conn)
            .await?;
        Ok(killed as u64)
    }

    async fn archive_job(&mut self, job_id: Uuid, now: DateTime<Utc>) -> SchedulerResult<u64> {
        let archived = diesel::update(jobs::table.find(job_id))
            .set((
                jobs::state.eq(ResourceState::Archived),
                jobs::etag.eq(Uuid::new_v4()),
                jobs::updated_at.eq(now),
            ))
            .execute(self.conn)
            .await?;
        Ok(archived as u64)
    }

    async fn purge_archived_jobs(&mut self) -> SchedulerResult<u64> {
        // jobstates, jobs_components, jobs_events and files cascade.
        let purged = diesel::delete(jobs::table.filter(jobs::state.eq(ResourceState::Archived)))
            .execute(self.conn)
            .await?;
        Ok(purged as u64)
    }
}

#[async_trait]
impl JobstateRepository for PgStore<'_> {
    async fn insert_jobstate(&mut self, jobstate: &Jobstate) -> SchedulerResult<Jobstate> {
        let result = diesel::insert_into(jobstates::table)
            .values(jobstate)
            .returning(Jobstate::as_returning())
            .get_result(self.conn)
            .await?;
        Ok(result)
    }

    async fn jobstates_for_job(&mut self, job_id: Uuid) -> SchedulerResult<Vec<Jobstate>> {
        let results = jobstates::table
            .filter(jobstates::job_id.eq(job_id))
            .order(jobstates::created_at.asc())
            .select(Jobstate::as_select())
            .load(self.conn)
            .await?;
        Ok(results)
    }
}

#[async_trait]
impl JobEventRepository for PgStore<'_> {
    async fn insert_job_event(&mut self, event: &JobEvent) -> SchedulerResult<JobEvent> {
        let result = diesel::insert_into(jobs_events::table)
            .values(event)
            .returning(JobEvent::as_returning())
            .get_result(self.conn)
            .await?;
        Ok(result)
    }

    async fn job_events_from(
        &mut self,
        sequence: i64,
        limit: i64,
    ) -> SchedulerResult<Vec<JobEvent>> {
        let results = jobs_events::table
            .filter(jobs_events::id.ge(sequence))
            .order(jobs_events::id.asc())
            .limit(limit)
            .select(JobEvent::as_select())
            .load(self.conn)
            .await?;
        Ok(results)
    }

    async fn purge_job_events_from(&mut self, sequence: i64) -> SchedulerResult<u64> {
        let purged = diesel::delete(jobs_events::table.filter(jobs_events::id.ge(sequence)))
            .execute(self.conn)
            .await?;
        Ok(purged as u64)
    }
}

#[async_trait]
impl FileRepository for PgStore<'_> {
    async fn files_for_job(&mut self, job_id: Uuid) -> SchedulerResult<Vec<JobFile>> {
        let results = files::table
            .filter(files::job_id.eq(job_id))
            .filter(files::state.ne(ResourceState::Archived))
            .order(files::created_at.asc())
            .select(JobFile::as_select())
            .load(self.conn)
            .await?;
        Ok(results)
    }

    async fn archive_files_for_job(&mut self, job_id: Uuid) -> SchedulerResult<u64> {
        let archived = diesel::update(files::table.filter(files::job_id.eq(job_id)))
            .set(files::state.eq(ResourceState::Archived))
            .execute(self.conn)
            .await?;
        Ok(archived as u64)
    }
}

#[async_trait]
impl SequenceAllocator for PgStore<'_> {
    async fn next_sequence(&mut self, kind: &str) -> SchedulerResult<i64> {
        // The upsert holds the row lock until commit, so values are handed
        // out in commit order.
        let value = diesel::insert_into(sequences::table)
            .values((sequences::name.eq(kind), sequences::value.eq(1_i64)))
            .on_conflict(sequences::name)
            .do_update()
            .set(sequences::value.eq(sequences::value + 1_i64))
            .returning(sequences::value)
            .get_result::<i64>(self.conn)
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl CounterRepository for PgStore<'_> {
    async fn get_counter(&mut self, name: &str) -> SchedulerResult<Option<Counter>> {
        let counter = counters::table
            .find(name)
            .select(Counter::as_select())
            .first(self.conn)
            .await
            .optional()?;
        Ok(counter)
    }

    async fn create_counter(&mut self, counter: &Counter) -> SchedulerResult<()> {
        diesel::insert_into(counters::table)
            .values(counter)
            .on_conflict(counters::name)
            .do_nothing()
            .execute(self.conn)
            .await?;
        Ok(())
    }

    async fn update_counter(
        &mut self,
        name: &str,
        expected_etag: Uuid,
        sequence: i64,
        etag: Uuid,
    ) -> SchedulerResult<bool> {
        let updated = counter_update_statement(name, expected_etag, sequence, etag)
            .execute(self.conn)
            .await?;
        Ok(updated == 1)
    }
}
