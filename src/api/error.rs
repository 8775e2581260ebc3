use crate::models::RelayStep;
use crate::services::error::RelayError;
use crate::services::relay::RelayFailure;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Error body returned by every endpoint.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<RelayStep>,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("{step} step failed: {source}")]
    Relay {
        step: RelayStep,
        #[source]
        source: RelayError,
    },
}

impl AppError {
    pub fn relay(step: RelayStep, source: RelayError) -> Self {
        AppError::Relay { step, source }
    }
}

impl From<RelayFailure> for AppError {
    fn from(failure: RelayFailure) -> Self {
        AppError::relay(failure.step, failure.error)
    }
}

fn relay_status(error: &RelayError) -> StatusCode {
    match error {
        RelayError::NoFileProvided => StatusCode::BAD_REQUEST,
        RelayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        RelayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RelayError::Auth(_)
        | RelayError::Upstream(_)
        | RelayError::Conversion(_)
        | RelayError::Network(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: msg,
                    kind: "bad_request".to_string(),
                    step: Some(RelayStep::Receive),
                },
            ),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: msg,
                    kind: "missing_api_key".to_string(),
                    step: None,
                },
            ),
            AppError::Relay { step, source } => {
                let status = relay_status(&source);
                if status.is_server_error() {
                    tracing::error!("Relay failed at {}: {}", step, source);
                }
                (
                    status,
                    ErrorResponse {
                        error: source.to_string(),
                        kind: source.kind().to_string(),
                        step: Some(step),
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            relay_status(&RelayError::NoFileProvided),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            relay_status(&RelayError::PayloadTooLarge { limit: 1 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            relay_status(&RelayError::Auth("nope".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            relay_status(&RelayError::Io(std::io::Error::other("disk full"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_relay_failure_converts_with_step() {
        let err: AppError =
            RelayFailure::new(RelayStep::Convert, RelayError::Conversion("bad".into())).into();
        assert_eq!(err.to_string(), "convert step failed: Conversion failed: bad");
    }
}
