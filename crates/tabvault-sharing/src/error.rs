//! Sharing error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharingError {
    #[error("Shared session not found or expired")]
    NotFound,

    #[error("Shared session has expired")]
    Expired,

    #[error("Share lifetime must be between 1 and {max} hours, got {0}", max = crate::MAX_SHARE_TTL_HOURS)]
    InvalidLifetime(i64),

    #[error("Shared package is invalid: {0}")]
    InvalidPackage(String),

    #[error("Token registry error: {0}")]
    Registry(String),

    #[error("Token registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Security(#[from] tabvault_security::SecurityError),

    #[error(transparent)]
    Session(#[from] tabvault_session::SessionError),

    #[error("Storage error: {0}")]
    Storage(#[from] tabvault_storage::StorageError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
