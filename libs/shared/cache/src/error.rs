use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid cache configuration: {0}")]
    Config(String),

    #[error("Cache {operation} timed out after {timeout:?} (key: {key})")]
    Timeout {
        operation: &'static str,
        key: String,
        timeout: Duration,
    },

    #[error("Cache {operation} failed (key: {key}): {reason}")]
    Unavailable {
        operation: &'static str,
        key: String,
        reason: String,
    },

    #[error("Corrupt cache payload at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    /// Timeouts and backend failures may clear up on a later attempt.
    /// Corrupt payloads and bad configuration will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Timeout { .. } | CacheError::Unavailable { .. })
    }
}
