use thiserror::Error;

use shared_cache::CacheError;
use shared_models::{AppError, ErrorKind};

#[derive(Error, Debug)]
pub enum SlotError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("{upstream} unavailable: {reason}")]
    UpstreamUnavailable { upstream: &'static str, reason: String },

    #[error("Invalid response from {upstream}: {reason}")]
    InvalidResponse { upstream: &'static str, reason: String },
}

impl SlotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SlotError::Validation(_) | SlotError::Routing(_) => ErrorKind::Terminal,
            SlotError::Cache(CacheError::Corrupt { .. }) => ErrorKind::Malformed,
            SlotError::Cache(e) if e.is_transient() => ErrorKind::Transient,
            SlotError::Cache(_) => ErrorKind::Terminal,
            SlotError::UpstreamUnavailable { .. } => ErrorKind::Transient,
            SlotError::InvalidResponse { .. } => ErrorKind::Malformed,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<SlotError> for AppError {
    fn from(err: SlotError) -> Self {
        let message = err.to_string();
        match err {
            SlotError::Validation(_) => AppError::ValidationError(message),
            SlotError::Routing(_) => AppError::Routing(message),
            other => match other.kind() {
                ErrorKind::Transient => AppError::ServiceUnavailable(message),
                ErrorKind::Malformed => AppError::InvalidResponse(message),
                ErrorKind::Terminal => AppError::Internal(message),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;

    #[test]
    fn classifies_and_maps_to_app_errors() {
        let unavailable = SlotError::UpstreamUnavailable {
            upstream: "bifrost",
            reason: "connection refused".into(),
        };
        assert!(unavailable.is_retryable());
        assert_matches!(AppError::from(unavailable), AppError::ServiceUnavailable(_));

        let corrupt = SlotError::Cache(CacheError::Corrupt {
            key: "k".into(),
            source: serde_json::from_str::<serde_json::Value>("[").unwrap_err(),
        });
        assert_eq!(corrupt.kind(), ErrorKind::Malformed);
        assert_matches!(AppError::from(corrupt), AppError::InvalidResponse(_));

        let timeout = SlotError::Cache(CacheError::Timeout {
            operation: "GET",
            key: "k".into(),
            timeout: Duration::from_secs(5),
        });
        assert_eq!(timeout.kind(), ErrorKind::Transient);

        assert_matches!(
            AppError::from(SlotError::Routing("no tenant".into())),
            AppError::Routing(_)
        );
    }
}
