//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use multiserver_common::Error;
use tracing::{error, warn};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::AlreadyExists { .. } => StatusCode::CONFLICT,
            Error::Validation { .. } | Error::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotInitialized { .. } | Error::InvalidStateTransition { .. } => {
                StatusCode::CONFLICT
            }
            Error::CommandFailed { .. } => StatusCode::BAD_GATEWAY,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Io(_) | Error::Database(_) | Error::Serialization(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            warn!("Request rejected: {}", err);
        }

        ApiError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::not_found(7), StatusCode::NOT_FOUND),
            (
                Error::AlreadyExists {
                    field: "port".into(),
                    value: "8001".into(),
                },
                StatusCode::CONFLICT,
            ),
            (Error::validation("port", "too low"), StatusCode::UNPROCESSABLE_ENTITY),
            (
                Error::NotInitialized {
                    name: "blog".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                Error::CommandFailed {
                    command: "systemctl restart blog.service".into(),
                    code: Some(1),
                    stderr: String::new(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                Error::Timeout {
                    command: "git clone".into(),
                    seconds: 300,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (Error::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
