//! Session error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Timed out waiting for the session lock")]
    LockTimeout,

    #[error("Failed to decrypt session and no backup found")]
    Unrecoverable,

    #[error("Session record {id} is damaged: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Category name cannot be empty")]
    EmptyCategory,

    #[error("No saved cookies for session {0}")]
    NoCookiePackage(String),

    #[error(transparent)]
    Security(#[from] tabvault_security::SecurityError),

    #[error("Storage error: {0}")]
    Storage(#[from] tabvault_storage::StorageError),

    #[error("Cookie error: {0}")]
    Cookie(#[from] tabvault_cookies::CookieError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
