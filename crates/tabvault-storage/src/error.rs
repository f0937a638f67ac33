//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage quota exceeded: {required} bytes required, {quota} bytes available")]
    QuotaExceeded { required: u64, quota: u64 },

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}
