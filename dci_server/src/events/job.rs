//! Job notification definitions.

use serde::{Deserialize, Serialize};

use crate::models::component::Component;
use crate::models::file::JobFile;
use crate::models::job::{Job, JobStatus};
use crate::models::remoteci::Remoteci;
use crate::models::topic::Topic;

/// Serialized view of a job at the moment it reached a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job: Job,
    pub components: Vec<Component>,
    pub files: Vec<JobFile>,
    pub topic: Option<Topic>,
    pub remoteci: Option<Remoteci>,
}

/// Notifications handed to the notifier once the transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobNotification {
    /// A job entered success, failure or error.
    JobFinished {
        event_id: i64,
        status: JobStatus,
        #[serde(flatten)]
        snapshot: JobSnapshot,
    },
}

impl JobNotification {
    /// Routing key passed to the notifier.
    pub fn kind(&self) -> &'static str {
        match self {
            JobNotification::JobFinished { .. } => "job_finished",
        }
    }

    pub fn job_id(&self) -> uuid::Uuid {
        match self {
            JobNotification::JobFinished { snapshot, .. } => snapshot.job.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::ResourceState;

    #[test]
    fn job_finished_is_tagged_and_flattened() {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            remoteci_id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            topic_id: Uuid::new_v4(),
            product_id: None,
            rconfiguration_id: None,
            previous_job_id: None,
            status: JobStatus::Failure,
            comment: None,
            duration: 42,
            etag: Uuid::new_v4(),
            state: ResourceState::Active,
            created_at: now,
            updated_at: now,
        };
        let notification = JobNotification::JobFinished {
            event_id: 7,
            status: JobStatus::Failure,
            snapshot: JobSnapshot {
                job: job.clone(),
                components: Vec::new(),
                files: Vec::new(),
                topic: None,
                remoteci: None,
            },
        };

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "job_finished");
        assert_eq!(value["event_id"], 7);
        assert_eq!(value["status"], "failure");
        assert_eq!(value["job"]["id"], job.id.to_string());
        assert_eq!(value["job"]["duration"], 42);
        assert!(value["components"].as_array().unwrap().is_empty());
        assert_eq!(notification.kind(), "job_finished");
        assert_eq!(notification.job_id(), job.id);
    }
}
