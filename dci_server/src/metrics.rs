//! Prometheus metrics for the scheduling engine.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a job created by the scheduler. `mode` is `type`, `components`
/// or `upgrade`.
pub fn job_scheduled(mode: &'static str) {
    counter!("dci_jobs_scheduled_total", "mode" => mode).increment(1);
}

/// Record a job status transition.
pub fn job_status_changed(status: &str) {
    counter!("dci_job_status_total", "status" => status.to_string()).increment(1);
}

/// Record jobs killed by the reaper.
pub fn jobs_killed(count: u64) {
    counter!("dci_jobs_killed_total").increment(count);
}

pub fn job_event_emitted() {
    counter!("dci_job_events_total").increment(1);
}

/// Record job duration at its final status.
pub fn job_duration(duration_secs: i32) {
    histogram!("dci_job_duration_seconds").record(f64::from(duration_secs));
}

pub fn notification_failed() {
    counter!("dci_notifications_failed_total").increment(1);
}

/// Record a rejected schedule request.
pub fn schedule_failed(reason: &'static str) {
    counter!("dci_schedule_failures_total", "reason" => reason).increment(1);
}
