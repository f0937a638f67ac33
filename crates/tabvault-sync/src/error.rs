//! Sync error types

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync server rejected credentials")]
    Unauthorized,

    #[error("Sync server returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// From a `Retry-After` header
        retry_after: Option<Duration>,
    },

    #[error("Sync request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sync failed after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("Invalid sync endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Storage error: {0}")]
    Storage(#[from] tabvault_storage::StorageError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Worth another attempt with the same credentials
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Status { status, message, .. } => {
                crate::retry::is_retryable_http_error(*status, message)
            }
            SyncError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
