use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{dao::storage::StorageError, engine::task_queue::QueueError};

/// Failures surfaced by the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The record document store could not be reached or decoded.
    #[error("record store failure")]
    Records(#[from] StorageError),
    /// The engine queue rejected or lost the operation.
    #[error("grace train engine failure")]
    Engine(#[from] QueueError),
    /// The depot could not answer a direct lookup.
    #[error("depot lookup failed: {0}")]
    Depot(String),
    /// The caller sent something the engine cannot use.
    #[error("rejected input: {0}")]
    InvalidInput(String),
}

/// HTTP-facing error: a status code and a message rendered as `{"code", "message"}`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Status code this error will be answered with.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Engine(QueueError::TaskPanicked(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Records(_) | ServiceError::Engine(_) | ServiceError::Depot(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        let message = match &err {
            ServiceError::Records(source) => format!("{err}: {source}"),
            ServiceError::Engine(source) => format!("{err}: {source}"),
            _ => err.to_string(),
        };
        Self::new(status, message)
    }
}

#[derive(Serialize)]
struct Body<'a> {
    code: u16,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Body {
            code: self.status.as_u16(),
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panicked_task_is_an_internal_error() {
        let err = AppError::from(ServiceError::Engine(QueueError::TaskPanicked("boom".into())));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn closed_queue_is_unavailable() {
        let err = AppError::from(ServiceError::Engine(QueueError::Closed("grace-train")));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invalid_input_is_a_bad_request() {
        let err = AppError::from(ServiceError::InvalidInput("id".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
