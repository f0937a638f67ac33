//! Error classification
//!
//! Turns raw failure text into a closed set of codes, each with fixed
//! user-facing copy. Matching is keyword based and never fails.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    SessionExpired,
    InvalidToken,
    CookieRestorationFailed,
    EncryptionFailed,
    AccessDenied,
    UnknownError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorInfo {
    pub title: &'static str,
    pub message: &'static str,
    pub action: &'static str,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SessionExpired => "session-expired",
            ErrorCode::InvalidToken => "invalid-token",
            ErrorCode::CookieRestorationFailed => "cookie-restoration-failed",
            ErrorCode::EncryptionFailed => "encryption-failed",
            ErrorCode::AccessDenied => "access-denied",
            ErrorCode::UnknownError => "unknown-error",
        }
    }

    pub fn info(&self) -> ErrorInfo {
        match self {
            ErrorCode::SessionExpired => ErrorInfo {
                title: "Session Expired",
                message: "This shared session is no longer available.",
                action: "Ask the owner to share the session again.",
            },
            ErrorCode::InvalidToken => ErrorInfo {
                title: "Invalid Share Link",
                message: "The share token is malformed or unknown.",
                action: "Check that the full link was copied correctly.",
            },
            ErrorCode::CookieRestorationFailed => ErrorInfo {
                title: "Cookie Restoration Failed",
                message: "Some cookies could not be restored, so you may need to sign in again.",
                action: "Sign in manually on the affected sites.",
            },
            ErrorCode::EncryptionFailed => ErrorInfo {
                title: "Encryption Error",
                message: "The session data could not be encrypted or decrypted.",
                action: "Try again, or restore the session from a backup.",
            },
            ErrorCode::AccessDenied => ErrorInfo {
                title: "Access Denied",
                message: "The engine lacks permission to complete this operation.",
                action: "Grant the requested permissions and retry.",
            },
            ErrorCode::UnknownError => ErrorInfo {
                title: "Something Went Wrong",
                message: "An unexpected error occurred.",
                action: "Retry the operation. If it keeps failing, restart the browser.",
            },
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map raw failure text to an error code.
pub fn classify(message: &str) -> ErrorCode {
    let message = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    if has(&["expired"]) {
        ErrorCode::SessionExpired
    } else if has(&["token", "invalid"]) {
        ErrorCode::InvalidToken
    } else if has(&["cookie", "restoration"]) {
        ErrorCode::CookieRestorationFailed
    } else if has(&["encrypt", "decrypt"]) {
        ErrorCode::EncryptionFailed
    } else if has(&["permission", "access"]) {
        ErrorCode::AccessDenied
    } else {
        ErrorCode::UnknownError
    }
}

/// A failure with its classification and user-facing copy attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub code: ErrorCode,
    pub title: String,
    pub message: String,
    pub action: String,
    /// The raw failure text
    pub detail: String,
}

impl ClassifiedError {
    pub fn from_message(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let code = classify(&detail);
        let info = code.info();

        Self {
            code,
            title: info.title.to_string(),
            message: info.message.to_string(),
            action: info.action.to_string(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_classification() {
        assert_eq!(classify("Shared session has expired"), ErrorCode::SessionExpired);
        assert_eq!(classify("Invalid share token format"), ErrorCode::InvalidToken);
        assert_eq!(classify("Cookie restoration failed"), ErrorCode::CookieRestorationFailed);
        assert_eq!(classify("Decryption failed: aead::Error"), ErrorCode::EncryptionFailed);
        assert_eq!(classify("Permission denied by host"), ErrorCode::AccessDenied);
        assert_eq!(classify("disk on fire"), ErrorCode::UnknownError);
    }

    #[test]
    fn test_priority_order() {
        // "expired" wins over "token"
        assert_eq!(classify("token expired"), ErrorCode::SessionExpired);
        assert_eq!(classify("invalid cookie"), ErrorCode::InvalidToken);
    }

    #[test]
    fn test_classified_error_carries_copy() {
        let err = ClassifiedError::from_message("");
        assert_eq!(err.code, ErrorCode::UnknownError);
        assert_eq!(err.title, ErrorCode::UnknownError.info().title);
    }

    #[test]
    fn test_code_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorCode::CookieRestorationFailed).unwrap();
        assert_eq!(json, "\"cookie-restoration-failed\"");
    }
}
