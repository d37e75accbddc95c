//! In-memory store and fixtures for engine unit tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use super::{
    ComponentRepository, CounterRepository, FileRepository, JobEventRepository, JobRepository,
    JobstateRepository, RConfigurationRepository, RemoteciRepository, SequenceAllocator,
    TopicRepository,
};
use crate::error::SchedulerResult;
use crate::models::component::Component;
use crate::models::file::JobFile;
use crate::models::job::{Job, JobStatus, JobStatusUpdate};
use crate::models::job_event::{Counter, JobEvent};
use crate::models::jobstate::Jobstate;
use crate::models::rconfiguration::RConfiguration;
use crate::models::remoteci::Remoteci;
use crate::models::topic::Topic;
use crate::models::ResourceState;

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub topics: Vec<Topic>,
    pub grants: HashSet<(Uuid, Uuid)>,
    pub components: Vec<Component>,
    pub remotecis: Vec<Remoteci>,
    pub rconfigurations: Vec<RConfiguration>,
    pub attachments: Vec<(Uuid, Uuid)>,
    pub jobs: Vec<Job>,
    pub job_components: Vec<(Uuid, Uuid)>,
    pub jobstates: Vec<Jobstate>,
    pub job_events: Vec<JobEvent>,
    pub files: Vec<JobFile>,
    pub sequences: HashMap<String, i64>,
    pub counters: HashMap<String, Counter>,
}

/// A fixed reference instant so fixture timestamps are reproducible.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

impl MemoryStore {
    pub fn add_topic(&mut self, name: &str, types: &[&str]) -> Topic {
        let topic = Topic {
            id: Uuid::new_v4(),
            name: name.to_string(),
            product_id: Some(Uuid::new_v4()),
            component_types: types.iter().map(|t| t.to_string()).collect(),
            optional_component_types: Vec::new(),
            export_control: false,
            next_topic_id: None,
            state: ResourceState::Active,
            created_at: epoch(),
            updated_at: epoch(),
        };
        self.topics.push(topic.clone());
        topic
    }

    pub fn add_remoteci(&mut self, team_id: Uuid) -> Remoteci {
        let remoteci = Remoteci {
            id: Uuid::new_v4(),
            name: "lab-rci".to_string(),
            team_id,
            state: ResourceState::Active,
            created_at: epoch(),
            updated_at: epoch(),
        };
        self.remotecis.push(remoteci.clone());
        remoteci
    }

    pub fn grant(&mut self, topic_id: Uuid, team_id: Uuid) {
        self.grants.insert((topic_id, team_id));
    }

    /// Active, exported, globally visible component created `age` before epoch.
    pub fn add_component(&mut self, topic_id: Uuid, type_: &str, age: Duration) -> Component {
        let created_at = epoch() - age;
        let component = Component {
            id: Uuid::new_v4(),
            topic_id,
            type_: type_.to_string(),
            name: format!("{type_}-{}", created_at.timestamp()),
            export_control: true,
            team_id: None,
            state: ResourceState::Active,
            created_at,
            updated_at: created_at,
        };
        self.components.push(component.clone());
        component
    }

    pub fn add_rconfiguration(
        &mut self,
        remoteci_id: Uuid,
        topic_id: Uuid,
        name: &str,
        created_at: DateTime<Utc>,
        component_types: Option<&[&str]>,
    ) -> RConfiguration {
        let rconfiguration = RConfiguration {
            id: Uuid::new_v4(),
            topic_id,
            name: name.to_string(),
            component_types: component_types
                .map(|types| types.iter().map(|t| t.to_string()).collect()),
            state: ResourceState::Active,
            created_at,
            updated_at: created_at,
        };
        self.rconfigurations.push(rconfiguration.clone());
        self.attachments.push((remoteci_id, rconfiguration.id));
        rconfiguration
    }

    pub fn job(&self, job_id: Uuid) -> &Job {
        self.jobs
            .iter()
            .find(|j| j.id == job_id)
            .expect("job exists")
    }

    fn job_mut(&mut self, job_id: Uuid) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == job_id)
    }
}

#[async_trait]
impl TopicRepository for MemoryStore {
    async fn get_topic(&mut self, topic_id: Uuid) -> SchedulerResult<Option<Topic>> {
        Ok(self.topics.iter().find(|t| t.id == topic_id).cloned())
    }

    async fn team_has_grant(&mut self, topic_id: Uuid, team_id: Uuid) -> SchedulerResult<bool> {
        Ok(self.grants.contains(&(topic_id, team_id)))
    }
}

#[async_trait]
impl RemoteciRepository for MemoryStore {
    async fn get_remoteci(&mut self, remoteci_id: Uuid) -> SchedulerResult<Option<Remoteci>> {
        Ok(self.remotecis.iter().find(|r| r.id == remoteci_id).cloned())
    }
}

#[async_trait]
impl ComponentRepository for MemoryStore {
    async fn latest_active_component(
        &mut self,
        topic_id: Uuid,
        component_type: &str,
        export_control_required: bool,
    ) -> SchedulerResult<Option<Component>> {
        Ok(self
            .components
            .iter()
            .filter(|c| c.topic_id == topic_id && c.type_ == component_type)
            .filter(|c| c.is_active() && c.team_id.is_none())
            .filter(|c| c.export_control || !export_control_required)
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn get_component(&mut self, component_id: Uuid) -> SchedulerResult<Option<Component>> {
        Ok(self.components.iter().find(|c| c.id == component_id).cloned())
    }

    async fn components_for_job(&mut self, job_id: Uuid) -> SchedulerResult<Vec<Component>> {
        let ids: Vec<Uuid> = self
            .job_components
            .iter()
            .filter(|(j, _)| *j == job_id)
            .map(|(_, c)| *c)
            .collect();
        Ok(ids
            .iter()
            .filter_map(|id| self.components.iter().find(|c| c.id == *id).cloned())
            .collect())
    }
}

#[async_trait]
impl RConfigurationRepository for MemoryStore {
    async fn rconfigurations_for_remoteci(
        &mut self,
        remoteci_id: Uuid,
        topic_id: Uuid,
    ) -> SchedulerResult<Vec<RConfiguration>> {
        let attached: HashSet<Uuid> = self
            .attachments
            .iter()
            .filter(|(r, _)| *r == remoteci_id)
            .map(|(_, c)| *c)
            .collect();
        // Insertion order on purpose: the selector must impose its own order.
        Ok(self
            .rconfigurations
            .iter()
            .filter(|c| attached.contains(&c.id) && c.topic_id == topic_id)
            .filter(|c| c.state != ResourceState::Archived)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn insert_job(&mut self, job: &Job) -> SchedulerResult<Job> {
        self.jobs.push(job.clone());
        Ok(job.clone())
    }

    async fn get_job(&mut self, job_id: Uuid) -> SchedulerResult<Option<Job>> {
        Ok(self.jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn list_jobs(
        &mut self,
        team_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> SchedulerResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|j| j.state != ResourceState::Archived)
            .filter(|j| team_id.map_or(true, |t| t == j.team_id))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_jobs(&mut self, team_id: Option<Uuid>) -> SchedulerResult<i64> {
        Ok(self
            .jobs
            .iter()
            .filter(|j| j.state != ResourceState::Archived)
            .filter(|j| team_id.map_or(true, |t| t == j.team_id))
            .count() as i64)
    }

    async fn last_rconfiguration_id(
        &mut self,
        topic_id: Uuid,
        remoteci_id: Uuid,
    ) -> SchedulerResult<Option<Uuid>> {
        Ok(self
            .jobs
            .iter()
            .filter(|j| j.topic_id == topic_id && j.remoteci_id == remoteci_id)
            .max_by_key(|j| j.created_at)
            .and_then(|j| j.rconfiguration_id))
    }

    async fn link_components(
        &mut self,
        job_id: Uuid,
        component_ids: &[Uuid],
    ) -> SchedulerResult<()> {
        self.job_components
            .extend(component_ids.iter().map(|c| (job_id, *c)));
        Ok(())
    }

    async fn update_job_status(
        &mut self,
        job_id: Uuid,
        expected_etag: Uuid,
        update: &JobStatusUpdate,
    ) -> SchedulerResult<Option<Job>> {
        let Some(job) = self.job_mut(job_id) else {
            return Ok(None);
        };
        if job.etag != expected_etag {
            return Ok(None);
        }
        job.status = update.status;
        if update.comment.is_some() {
            job.comment = update.comment.clone();
        }
        job.duration = update.duration;
        job.etag = update.etag;
        job.updated_at = update.updated_at;
        Ok(Some(job.clone()))
    }

    async fn kill_stale_jobs(
        &mut self,
        remoteci_id: Uuid,
        topic_id: Option<Uuid>,
        created_before: DateTime<Utc>,
    ) -> SchedulerResult<u64> {
        let mut killed = 0;
        for job in self.jobs.iter_mut() {
            let in_scope = job.remoteci_id == remoteci_id
                && topic_id.map_or(true, |t| t == job.topic_id);
            if in_scope
                && JobStatus::ACTIVE.contains(&job.status)
                && job.created_at < created_before
            {
                job.status = JobStatus::Killed;
                killed += 1;
            }
        }
        Ok(killed)
    }

    async fn archive_job(&mut self, job_id: Uuid, now: DateTime<Utc>) -> SchedulerResult<u64> {
        let Some(job) = self.job_mut(job_id) else {
            return Ok(0);
        };
        job.state = ResourceState::Archived;
        job.etag = Uuid::new_v4();
        job.updated_at = now;
        Ok(1)
    }

    async fn purge_archived_jobs(&mut self) -> SchedulerResult<u64> {
        let purged: HashSet<Uuid> = self
            .jobs
            .iter()
            .filter(|j| j.state == ResourceState::Archived)
            .map(|j| j.id)
            .collect();
        self.jobs.retain(|j| !purged.contains(&j.id));
        self.job_components.retain(|(j, _)| !purged.contains(j));
        self.jobstates.retain(|s| !purged.contains(&s.job_id));
        self.job_events.retain(|e| !purged.contains(&e.job_id));
        self.files.retain(|f| !purged.contains(&f.job_id));
        Ok(purged.len() as u64)
    }
}

#[async_trait]
impl JobstateRepository for MemoryStore {
    async fn insert_jobstate(&mut self, jobstate: &Jobstate) -> SchedulerResult<Jobstate> {
        self.jobstates.push(jobstate.clone());
        Ok(jobstate.clone())
    }

    async fn jobstates_for_job(&mut self, job_id: Uuid) -> SchedulerResult<Vec<Jobstate>> {
        Ok(self
            .jobstates
            .iter()
            .filter(|s| s.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl JobEventRepository for MemoryStore {
    async fn insert_job_event(&mut self, event: &JobEvent) -> SchedulerResult<JobEvent> {
        self.job_events.push(event.clone());
        Ok(event.clone())
    }

    async fn job_events_from(
        &mut self,
        sequence: i64,
        limit: i64,
    ) -> SchedulerResult<Vec<JobEvent>> {
        let mut events: Vec<JobEvent> = self
            .job_events
            .iter()
            .filter(|e| e.id >= sequence)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.id);
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }

    async fn purge_job_events_from(&mut self, sequence: i64) -> SchedulerResult<u64> {
        let before = self.job_events.len();
        self.job_events.retain(|e| e.id < sequence);
        Ok((before - self.job_events.len()) as u64)
    }
}

#[async_trait]
impl FileRepository for MemoryStore {
    async fn files_for_job(&mut self, job_id: Uuid) -> SchedulerResult<Vec<JobFile>> {
        Ok(self
            .files
            .iter()
            .filter(|f| f.job_id == job_id && f.state != ResourceState::Archived)
            .cloned()
            .collect())
    }

    async fn archive_files_for_job(&mut self, job_id: Uuid) -> SchedulerResult<u64> {
        let mut archived = 0;
        for file in self.files.iter_mut().filter(|f| f.job_id == job_id) {
            file.state = ResourceState::Archived;
            archived += 1;
        }
        Ok(archived)
    }
}

#[async_trait]
impl SequenceAllocator for MemoryStore {
    async fn next_sequence(&mut self, kind: &str) -> SchedulerResult<i64> {
        let value = self.sequences.entry(kind.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

#[async_trait]
impl CounterRepository for MemoryStore {
    async fn get_counter(&mut self, name: &str) -> SchedulerResult<Option<Counter>> {
        Ok(self.counters.get(name).cloned())
    }

    async fn create_counter(&mut self, counter: &Counter) -> SchedulerResult<()> {
        self.counters
            .entry(counter.name.clone())
            .or_insert_with(|| counter.clone());
        Ok(())
    }

    async fn update_counter(
        &mut self,
        name: &str,
        expected_etag: Uuid,
        sequence: i64,
        etag: Uuid,
    ) -> SchedulerResult<bool> {
        match self.counters.get_mut(name) {
            Some(counter) if counter.etag == expected_etag => {
                counter.sequence = sequence;
                counter.etag = etag;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
