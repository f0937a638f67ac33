//! Cookie transport error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CookieError {
    #[error("Invalid cookie domain: {0}")]
    InvalidDomain(String),

    #[error("Cookie jar error: {0}")]
    Host(#[from] tabvault_model::HostError),

    #[error("Storage error: {0}")]
    Storage(#[from] tabvault_storage::StorageError),

    #[error("No cookie backup found for {0}")]
    BackupNotFound(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
