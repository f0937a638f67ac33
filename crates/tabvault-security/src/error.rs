//! Security error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("{}", describe_validation(.missing, .invalid))]
    Validation {
        missing: Vec<String>,
        invalid: Vec<String>,
    },

    #[error("Invalid share token format: {0}")]
    InvalidToken(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid master key: {0}")]
    InvalidKey(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_validation(missing: &[String], invalid: &[String]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing required fields: {}", missing.join(", ")));
    }
    if !invalid.is_empty() {
        parts.push(invalid.join("; "));
    }
    format!("Validation failed: {}", parts.join("; "))
}
