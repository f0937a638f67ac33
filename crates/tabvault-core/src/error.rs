//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] tabvault_storage::StorageError),

    #[error(transparent)]
    Security(#[from] tabvault_security::SecurityError),

    #[error(transparent)]
    Cookie(#[from] tabvault_cookies::CookieError),

    #[error(transparent)]
    Session(#[from] tabvault_session::SessionError),

    #[error(transparent)]
    Sharing(#[from] tabvault_sharing::SharingError),

    #[error(transparent)]
    Sync(#[from] tabvault_sync::SyncError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync is not configured")]
    SyncDisabled,

    #[error("Unknown action")]
    UnknownAction(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}
