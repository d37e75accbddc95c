//! DCI HTTP routes — scheduling, status reports, job events.

pub mod api;

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::AsyncPgConnection;
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::DciConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::services::job_lifecycle::{
    ComponentScheduleRequest, JobListQuery, ScheduleRequest, UpgradeRequest,
};
use crate::services::{Caller, Clock, Notifier, SchedulePolicy};

/// Header carrying the caller's team, set by the authenticating proxy.
pub const TEAM_HEADER: &str = "x-dci-team-id";
/// Header carrying the caller's role; `super_admin` lifts team scoping.
pub const ROLE_HEADER: &str = "x-dci-role";

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<AsyncPgConnection>,
    pub config: DciConfig,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub policy: SchedulePolicy,
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = SchedulerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers)
    }
}

fn caller_from_headers(headers: &HeaderMap) -> SchedulerResult<Caller> {
    let team_id = match headers.get(TEAM_HEADER) {
        None => None,
        Some(value) => {
            let raw = value.to_str().map_err(|_| SchedulerError::Unauthorized)?;
            Some(raw.trim().parse::<Uuid>().map_err(|_| SchedulerError::Unauthorized)?)
        }
    };
    let super_admin = headers
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|role| role.trim() == "super_admin");
    Ok(Caller {
        team_id,
        super_admin,
    })
}

/// The etag the client last saw, quoted or not.
fn if_match(headers: &HeaderMap) -> SchedulerResult<Uuid> {
    headers
        .get(header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().trim_matches('"').parse().ok())
        .ok_or(SchedulerError::PreconditionRequired("If-Match"))
}

fn etag_header(etag: Uuid) -> [(header::HeaderName, String); 1] {
    [(header::ETAG, format!("\"{etag}\""))]
}

/// Build the DCI Axum router (nested at `/api/v1`).
pub fn dci_router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout()));

    let api = Router::new()
        // Scheduling
        .route("/jobs/schedule", post(schedule_handler))
        .route("/jobs", get(list_jobs_handler).post(create_job_handler))
        .route("/jobs/upgrade", post(upgrade_job_handler))
        .route("/jobs/purge", post(purge_jobs_handler))
        // Job API
        .route(
            "/jobs/{job_id}",
            get(get_job_handler)
                .put(update_job_handler)
                .delete(delete_job_handler),
        )
        .route("/jobs/{job_id}/jobstates", get(list_jobstates_handler))
        // Job events
        .route(
            "/jobs_events/sequence",
            get(current_sequence_handler).put(update_sequence_handler),
        )
        .route(
            "/jobs_events/{sequence}",
            get(list_job_events_handler).delete(purge_job_events_handler),
        )
        .with_state(state);

    Router::new().nest("/api/v1", api).layer(middleware)
}

// ── Scheduling ──

async fn schedule_handler(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<ScheduleRequest>,
) -> Result<Response, SchedulerError> {
    let scheduled = api::schedule_by_type(&state, &caller, req).await?;
    let etag = etag_header(scheduled.job.etag);
    Ok((StatusCode::CREATED, etag, Json(scheduled)).into_response())
}

async fn create_job_handler(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<ComponentScheduleRequest>,
) -> Result<Response, SchedulerError> {
    let scheduled = api::schedule_with_components(&state, &caller, req).await?;
    let etag = etag_header(scheduled.job.etag);
    Ok((StatusCode::CREATED, etag, Json(scheduled)).into_response())
}

async fn upgrade_job_handler(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<UpgradeRequest>,
) -> Result<Response, SchedulerError> {
    let scheduled = api::upgrade_job(&state, &caller, req).await?;
    let etag = etag_header(scheduled.job.etag);
    Ok((StatusCode::CREATED, etag, Json(scheduled)).into_response())
}

// ── Job API ──

async fn list_jobs_handler(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<JobListQuery>,
) -> Result<Json<serde_json::Value>, SchedulerError> {
    let listed = api::list_jobs(&state, &caller, query).await?;
    Ok(Json(serde_json::json!({
        "jobs": listed.jobs,
        "_meta": { "count": listed.count },
    })))
}

async fn get_job_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(job_id): Path<Uuid>,
) -> Result<Response, SchedulerError> {
    let details = api::get_job(&state, &caller, job_id).await?;
    let etag = etag_header(details.job.etag);
    Ok((etag, Json(details)).into_response())
}

async fn update_job_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<api::StatusUpdateRequest>,
) -> Result<Response, SchedulerError> {
    let expected = if_match(&headers)?;
    let job = api::update_status(&state, &caller, job_id, expected, req).await?;
    let etag = etag_header(job.etag);
    Ok((etag, Json(job)).into_response())
}

async fn delete_job_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, SchedulerError> {
    let expected = if_match(&headers)?;
    api::delete_job(&state, &caller, job_id, expected).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_jobstates_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(job_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, SchedulerError> {
    let jobstates = api::list_jobstates(&state, &caller, job_id).await?;
    Ok(Json(serde_json::json!({
        "jobstates": jobstates,
        "_meta": { "count": jobstates.len() },
    })))
}

async fn purge_jobs_handler(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<serde_json::Value>, SchedulerError> {
    let purged = api::purge_archived_jobs(&state, &caller).await?;
    Ok(Json(serde_json::json!({ "purged": purged })))
}

// ── Job events ──

#[derive(Debug, Deserialize)]
pub struct JobEventsQuery {
    pub limit: Option<i64>,
}

async fn list_job_events_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(sequence): Path<i64>,
    Query(query): Query<JobEventsQuery>,
) -> Result<Json<serde_json::Value>, SchedulerError> {
    let events = api::list_job_events(&state, &caller, sequence, query.limit).await?;
    Ok(Json(serde_json::json!({
        "jobs_events": events,
        "_meta": { "count": events.len() },
    })))
}

async fn purge_job_events_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(sequence): Path<i64>,
) -> Result<StatusCode, SchedulerError> {
    api::purge_job_events(&state, &caller, sequence).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn current_sequence_handler(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Response, SchedulerError> {
    let counter = api::current_sequence(&state, &caller).await?;
    let etag = etag_header(counter.etag);
    let body = serde_json::json!({
        "sequence": { "sequence": counter.sequence, "etag": counter.etag },
    });
    Ok((etag, Json(body)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct SequenceUpdate {
    pub sequence: i64,
}

async fn update_sequence_handler(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Json(req): Json<SequenceUpdate>,
) -> Result<Response, SchedulerError> {
    let expected = if_match(&headers)?;
    let counter = api::update_sequence(&state, &caller, req.sequence, expected).await?;
    Ok((StatusCode::NO_CONTENT, etag_header(counter.etag)).into_response())
}
