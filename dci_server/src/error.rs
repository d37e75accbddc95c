//! Error taxonomy for the scheduling engine and its HTTP mapping.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use uuid::Uuid;

/// What was looked up when a component could not be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentLookup {
    Type(String),
    Id(Uuid),
}

impl fmt::Display for ComponentLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentLookup::Type(t) => write!(f, "component of type \"{t}\""),
            ComponentLookup::Id(id) => write!(f, "component id {id}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("operation not permitted")]
    Unauthorized,

    #[error("remoteci \"{0}\" is not active")]
    RemoteciInactive(Uuid),

    #[error("topic \"{0}\" is not active")]
    TopicInactive(Uuid),

    #[error("{0} not found or not exported")]
    ComponentNotFound(ComponentLookup),

    #[error("the number of component ids ({ids}) does not match the component types {types:?}")]
    CountMismatch { ids: usize, types: Vec<String> },

    #[error("component types malformed: type {0} duplicated")]
    DuplicateType(String),

    #[error("component type {0} is not an optional type of the topic")]
    UnknownOptionalType(String),

    #[error("{0} header must be provided")]
    PreconditionRequired(&'static str),

    #[error("topic \"{0}\" has no next topic to upgrade to")]
    NoNextTopic(Uuid),

    #[error("conflict on {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("connection pool error: {0}")]
    Pool(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SchedulerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(entity: &'static str, id: impl ToString) -> Self {
        SchedulerError::Conflict {
            entity,
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SchedulerError::NotFound { .. } => StatusCode::NOT_FOUND,
            SchedulerError::Unauthorized => StatusCode::UNAUTHORIZED,
            SchedulerError::RemoteciInactive(_)
            | SchedulerError::TopicInactive(_)
            | SchedulerError::ComponentNotFound(_)
            | SchedulerError::CountMismatch { .. }
            | SchedulerError::DuplicateType(_)
            | SchedulerError::UnknownOptionalType(_)
            | SchedulerError::PreconditionRequired(_) => StatusCode::PRECONDITION_FAILED,
            SchedulerError::NoNextTopic(_) => StatusCode::BAD_REQUEST,
            SchedulerError::Conflict { .. } => StatusCode::CONFLICT,
            SchedulerError::Database(_) | SchedulerError::Pool(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label used for the failure metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SchedulerError::NotFound { .. } => "not_found",
            SchedulerError::Unauthorized => "unauthorized",
            SchedulerError::RemoteciInactive(_) => "remoteci_inactive",
            SchedulerError::TopicInactive(_) => "topic_inactive",
            SchedulerError::ComponentNotFound(_) => "component_not_found",
            SchedulerError::CountMismatch { .. } => "count_mismatch",
            SchedulerError::DuplicateType(_) => "duplicate_type",
            SchedulerError::UnknownOptionalType(_) => "unknown_optional_type",
            SchedulerError::PreconditionRequired(_) => "precondition_required",
            SchedulerError::NoNextTopic(_) => "no_next_topic",
            SchedulerError::Conflict { .. } => "conflict",
            SchedulerError::Database(_) => "database",
            SchedulerError::Pool(_) => "pool",
        }
    }
}

impl From<diesel::result::Error> for SchedulerError {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match e {
            Error::NotFound => SchedulerError::NotFound {
                entity: "row",
                id: "unknown".to_string(),
            },
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                let id = info
                    .constraint_name()
                    .or_else(|| info.table_name())
                    .unwrap_or("unique key")
                    .to_string();
                tracing::warn!(constraint = %id, "Unique violation: {}", info.message());
                SchedulerError::Conflict { entity: "row", id }
            }
            other => {
                tracing::error!("Diesel error: {other:?}");
                SchedulerError::Database(other.to_string())
            }
        }
    }
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            SchedulerError::Database(_) | SchedulerError::Pool(_) => {
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        let body = serde_json::json!({
            "message": message,
            "status_code": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
