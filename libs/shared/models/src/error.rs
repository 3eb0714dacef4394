use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// How a failure should be treated by callers: retry later, fix the
/// request, or distrust the upstream data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Transient,
    Terminal,
    Malformed,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ServiceUnavailable(_) => ErrorKind::Transient,
            AppError::InvalidResponse(_) => ErrorKind::Malformed,
            AppError::BadRequest(_)
            | AppError::ValidationError(_)
            | AppError::Routing(_)
            | AppError::Internal(_) => ErrorKind::Terminal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::ValidationError(_) | AppError::Routing(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::BadRequest(msg)
            | AppError::ValidationError(msg)
            | AppError::Routing(msg)
            | AppError::ServiceUnavailable(msg)
            | AppError::InvalidResponse(msg)
            | AppError::Internal(msg) => msg,
        };

        tracing::error!("Error: {}: {}", status, message);

        let body = Json(json!({
            "error": message,
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_kinds_to_statuses() {
        let cases = [
            (AppError::ValidationError("date".into()), StatusCode::BAD_REQUEST, ErrorKind::Terminal),
            (AppError::Routing("tenant".into()), StatusCode::BAD_REQUEST, ErrorKind::Terminal),
            (AppError::ServiceUnavailable("bifrost".into()), StatusCode::SERVICE_UNAVAILABLE, ErrorKind::Transient),
            (AppError::InvalidResponse("bifrost".into()), StatusCode::BAD_GATEWAY, ErrorKind::Malformed),
        ];

        for (error, status, kind) in cases {
            assert_eq!(error.status(), status);
            assert_eq!(error.kind(), kind);
        }
    }

    #[test]
    fn renders_json_body() {
        let response = AppError::ServiceUnavailable("cache down".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
