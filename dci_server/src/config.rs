//! DCI server configuration — loaded from environment variables.

use std::time::Duration;

use crate::services::SchedulePolicy;

#[derive(Clone, Debug)]
pub struct DciConfig {
    /// Age after which a non-final job is considered abandoned.
    pub stale_job_hours: i64,
    /// Only export-controlled components may be scheduled.
    pub require_export_control: bool,
    /// Webhook receiving job notifications. Unset means log only.
    pub notify_url: Option<String>,
    /// Size of the database connection pool.
    pub db_max_connections: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for DciConfig {
    fn default() -> Self {
        Self {
            stale_job_hours: 24,
            require_export_control: true,
            notify_url: None,
            db_max_connections: 10,
            request_timeout_secs: 30,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// A reaper threshold of zero or less would kill jobs that just started.
fn positive_hours(name: &str, hours: i64, default: i64) -> i64 {
    if hours > 0 {
        hours
    } else {
        tracing::warn!("{name}={hours} must be positive -- using {default}");
        default
    }
}

impl DciConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let stale_job_hours = positive_hours(
            "DCI_STALE_JOB_HOURS",
            env_or("DCI_STALE_JOB_HOURS", defaults.stale_job_hours),
            defaults.stale_job_hours,
        );
        let require_export_control =
            env_or("DCI_REQUIRE_EXPORT_CONTROL", defaults.require_export_control);
        let notify_url = std::env::var("DCI_NOTIFY_URL")
            .ok()
            .filter(|s| !s.is_empty());
        let db_max_connections = env_or("DCI_DB_MAX_CONNECTIONS", defaults.db_max_connections);
        let request_timeout_secs =
            env_or("DCI_REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs);

        if notify_url.is_none() {
            tracing::warn!("DCI_NOTIFY_URL not set -- job notifications are only logged");
        }
        if !require_export_control {
            tracing::warn!("DCI_REQUIRE_EXPORT_CONTROL disabled -- unexported components are schedulable");
        }

        Self {
            stale_job_hours,
            require_export_control,
            notify_url,
            db_max_connections,
            request_timeout_secs,
        }
    }

    pub fn policy(&self) -> SchedulePolicy {
        SchedulePolicy {
            stale_after: chrono::Duration::hours(self.stale_job_hours),
            require_export_control: self.require_export_control,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
