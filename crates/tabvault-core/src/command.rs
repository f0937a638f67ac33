//! Command surface
//!
//! Requests arrive as `{"action": "SAVE_SESSION", "payload": {...}}`. Payload
//! fields are camelCase; actions without arguments may omit the payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tabvault_cookies::ImportReport;
use tabvault_model::{ClassifiedError, Cookie, ErrorCode, Session};
use tabvault_sharing::ShareOptions;

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone)]
pub enum Command {
    SaveSession { session: Session },
    LoadSession { session_id: String },
    DeleteSession { session_id: String },
    ExportSessions,
    ImportSessions { sessions: Vec<Value> },
    GetSessions,
    UpdateSessionCategory { session_id: String, category: String },
    GetSessionsByCategory { category: String },
    SearchSessions { query: String },
    GetCategories,
    AddCategory { category: String },
    RemoveCategory { category: String },
    ToggleFavorite { session_id: String },
    ExportCookies { domain: String },
    ImportCookies { cookies: Vec<Cookie> },
    ClearCookies { domain: String },
    BackupCookies { domain: Option<String> },
    RestoreCookies { domain: Option<String> },
    GetDomains,
    SaveSessionWithCookies { session: Session },
    RestoreSessionWithCookies { session_id: String },
    ShareSession { session_id: String, options: ShareOptions },
    AccessSharedSession { token: String, accessor: Option<String> },
    RevokeSharedSession { token: String },
    ListSharedSessions,
}

#[derive(Debug, Deserialize)]
struct Request {
    action: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload {
    session: Session,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionIdPayload {
    session_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionsPayload {
    sessions: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryPayload {
    category: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCategoryPayload {
    session_id: String,
    category: String,
}

#[derive(Deserialize)]
struct QueryPayload {
    query: String,
}

#[derive(Deserialize)]
struct DomainPayload {
    domain: String,
}

#[derive(Deserialize)]
struct OptionalDomainPayload {
    #[serde(default)]
    domain: Option<String>,
}

#[derive(Deserialize)]
struct CookiesPayload {
    cookies: Vec<Cookie>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharePayload {
    session_id: String,
    #[serde(default)]
    options: ShareOptions,
}

#[derive(Deserialize)]
struct AccessPayload {
    token: String,
    #[serde(default)]
    accessor: Option<String>,
}

#[derive(Deserialize)]
struct TokenPayload {
    token: String,
}

fn payload<T: DeserializeOwned>(action: &str, value: Value) -> Result<T> {
    let value = match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(value)
        .map_err(|e| CoreError::InvalidCommand(format!("{action}: {e}")))
}

impl Command {
    /// Decode a request object
    pub fn from_json(request: Value) -> Result<Self> {
        let Request { action, payload: body } = serde_json::from_value(request)
            .map_err(|e| CoreError::InvalidCommand(e.to_string()))?;

        let command = match action.as_str() {
            "SAVE_SESSION" => {
                let p: SessionPayload = payload(&action, body)?;
                Command::SaveSession { session: p.session }
            }
            "LOAD_SESSION" => {
                let p: SessionIdPayload = payload(&action, body)?;
                Command::LoadSession { session_id: p.session_id }
            }
            "DELETE_SESSION" => {
                let p: SessionIdPayload = payload(&action, body)?;
                Command::DeleteSession { session_id: p.session_id }
            }
            "EXPORT_SESSIONS" => Command::ExportSessions,
            "IMPORT_SESSIONS" => {
                let p: SessionsPayload = payload(&action, body)?;
                Command::ImportSessions { sessions: p.sessions }
            }
            "GET_SESSIONS" => Command::GetSessions,
            "UPDATE_SESSION_CATEGORY" => {
                let p: UpdateCategoryPayload = payload(&action, body)?;
                Command::UpdateSessionCategory {
                    session_id: p.session_id,
                    category: p.category,
                }
            }
            "GET_SESSIONS_BY_CATEGORY" => {
                let p: CategoryPayload = payload(&action, body)?;
                Command::GetSessionsByCategory { category: p.category }
            }
            "SEARCH_SESSIONS" => {
                let p: QueryPayload = payload(&action, body)?;
                Command::SearchSessions { query: p.query }
            }
            "GET_CATEGORIES" => Command::GetCategories,
            "ADD_CATEGORY" => {
                let p: CategoryPayload = payload(&action, body)?;
                Command::AddCategory { category: p.category }
            }
            "REMOVE_CATEGORY" => {
                let p: CategoryPayload = payload(&action, body)?;
                Command::RemoveCategory { category: p.category }
            }
            "TOGGLE_FAVORITE" => {
                let p: SessionIdPayload = payload(&action, body)?;
                Command::ToggleFavorite { session_id: p.session_id }
            }
            "EXPORT_COOKIES" => {
                let p: DomainPayload = payload(&action, body)?;
                Command::ExportCookies { domain: p.domain }
            }
            "IMPORT_COOKIES" => {
                let p: CookiesPayload = payload(&action, body)?;
                Command::ImportCookies { cookies: p.cookies }
            }
            "CLEAR_COOKIES" => {
                let p: DomainPayload = payload(&action, body)?;
                Command::ClearCookies { domain: p.domain }
            }
            "BACKUP_COOKIES" => {
                let p: OptionalDomainPayload = payload(&action, body)?;
                Command::BackupCookies { domain: p.domain }
            }
            "RESTORE_COOKIES" => {
                let p: OptionalDomainPayload = payload(&action, body)?;
                Command::RestoreCookies { domain: p.domain }
            }
            "GET_DOMAINS" => Command::GetDomains,
            "SAVE_SESSION_WITH_COOKIES" => {
                let p: SessionPayload = payload(&action, body)?;
                Command::SaveSessionWithCookies { session: p.session }
            }
            "RESTORE_SESSION_WITH_COOKIES" => {
                let p: SessionIdPayload = payload(&action, body)?;
                Command::RestoreSessionWithCookies { session_id: p.session_id }
            }
            "SHARE_SESSION" => {
                let p: SharePayload = payload(&action, body)?;
                Command::ShareSession {
                    session_id: p.session_id,
                    options: p.options,
                }
            }
            "ACCESS_SHARED_SESSION" => {
                let p: AccessPayload = payload(&action, body)?;
                Command::AccessSharedSession {
                    token: p.token,
                    accessor: p.accessor,
                }
            }
            "REVOKE_SHARED_SESSION" => {
                let p: TokenPayload = payload(&action, body)?;
                Command::RevokeSharedSession { token: p.token }
            }
            "LIST_SHARED_SESSIONS" => Command::ListSharedSessions,
            _ => return Err(CoreError::UnknownAction(action)),
        };

        Ok(command)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Command::SaveSession { .. } => "SAVE_SESSION",
            Command::LoadSession { .. } => "LOAD_SESSION",
            Command::DeleteSession { .. } => "DELETE_SESSION",
            Command::ExportSessions => "EXPORT_SESSIONS",
            Command::ImportSessions { .. } => "IMPORT_SESSIONS",
            Command::GetSessions => "GET_SESSIONS",
            Command::UpdateSessionCategory { .. } => "UPDATE_SESSION_CATEGORY",
            Command::GetSessionsByCategory { .. } => "GET_SESSIONS_BY_CATEGORY",
            Command::SearchSessions { .. } => "SEARCH_SESSIONS",
            Command::GetCategories => "GET_CATEGORIES",
            Command::AddCategory { .. } => "ADD_CATEGORY",
            Command::RemoveCategory { .. } => "REMOVE_CATEGORY",
            Command::ToggleFavorite { .. } => "TOGGLE_FAVORITE",
            Command::ExportCookies { .. } => "EXPORT_COOKIES",
            Command::ImportCookies { .. } => "IMPORT_COOKIES",
            Command::ClearCookies { .. } => "CLEAR_COOKIES",
            Command::BackupCookies { .. } => "BACKUP_COOKIES",
            Command::RestoreCookies { .. } => "RESTORE_COOKIES",
            Command::GetDomains => "GET_DOMAINS",
            Command::SaveSessionWithCookies { .. } => "SAVE_SESSION_WITH_COOKIES",
            Command::RestoreSessionWithCookies { .. } => "RESTORE_SESSION_WITH_COOKIES",
            Command::ShareSession { .. } => "SHARE_SESSION",
            Command::AccessSharedSession { .. } => "ACCESS_SHARED_SESSION",
            Command::RevokeSharedSession { .. } => "REVOKE_SHARED_SESSION",
            Command::ListSharedSessions => "LIST_SHARED_SESSIONS",
        }
    }
}

/// Structured result of a command.
///
/// Failures carry the raw error plus its classification and remediation copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl CommandResponse {
    pub fn ok<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
                error_code: None,
                error_title: None,
                remediation: None,
            },
            Err(e) => Self::err(e.to_string()),
        }
    }

    pub fn done() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            error_code: None,
            error_title: None,
            remediation: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        let classified = ClassifiedError::from_message(message);
        Self {
            success: false,
            data: None,
            error: Some(classified.detail),
            error_code: Some(classified.code),
            error_title: Some(classified.title),
            remediation: Some(classified.action),
        }
    }

    pub fn unknown_action() -> Self {
        Self {
            success: false,
            data: None,
            error: Some("Unknown action".to_string()),
            error_code: None,
            error_title: None,
            remediation: None,
        }
    }

    pub fn from_result<T, E>(result: std::result::Result<T, E>) -> Self
    where
        T: Serialize,
        E: std::fmt::Display,
    {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }

    /// An import fails as a whole only when nothing reached the jar; the
    /// report is attached either way.
    pub fn from_import(report: ImportReport) -> Self {
        if report.success {
            return Self::ok(report);
        }

        let message = report
            .error
            .clone()
            .unwrap_or_else(|| "Cookie import failed".to_string());
        let mut response = Self::err(message);
        response.data = serde_json::to_value(&report).ok();
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_with_payload() {
        let command = Command::from_json(json!({
            "action": "UPDATE_SESSION_CATEGORY",
            "payload": { "sessionId": "session_1", "category": "work" }
        }))
        .unwrap();

        match command {
            Command::UpdateSessionCategory { session_id, category } => {
                assert_eq!(session_id, "session_1");
                assert_eq!(category, "work");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_without_payload() {
        let command = Command::from_json(json!({ "action": "GET_SESSIONS" })).unwrap();
        assert!(matches!(command, Command::GetSessions));

        let command =
            Command::from_json(json!({ "action": "BACKUP_COOKIES", "payload": null })).unwrap();
        assert!(matches!(command, Command::BackupCookies { domain: None }));
    }

    #[test]
    fn test_share_options_default() {
        let command = Command::from_json(json!({
            "action": "SHARE_SESSION",
            "payload": { "sessionId": "session_1" }
        }))
        .unwrap();

        let Command::ShareSession { options, .. } = command else {
            panic!("expected SHARE_SESSION");
        };
        assert!(options.encrypt);
        assert!(options.include_cookies);
        assert!(!options.one_time);
    }

    #[test]
    fn test_unknown_and_malformed() {
        let err = Command::from_json(json!({ "action": "FORMAT_DISK" })).unwrap_err();
        assert!(matches!(err, CoreError::UnknownAction(ref a) if a == "FORMAT_DISK"));
        assert_eq!(err.to_string(), "Unknown action");

        let err = Command::from_json(json!({ "action": "LOAD_SESSION", "payload": {} }))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCommand(_)));

        assert!(Command::from_json(json!({ "payload": {} })).is_err());
    }

    #[test]
    fn test_action_names_round_trip() {
        let command = Command::from_json(json!({
            "action": "ACCESS_SHARED_SESSION",
            "payload": { "token": "share_1_abc" }
        }))
        .unwrap();
        assert_eq!(command.action(), "ACCESS_SHARED_SESSION");
    }

    #[test]
    fn test_error_response_is_classified() {
        let response = CommandResponse::err("Shared session has expired");
        assert!(!response.success);
        assert_eq!(response.error_code, Some(ErrorCode::SessionExpired));
        assert_eq!(response.error_title.as_deref(), Some("Session Expired"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["errorCode"], "session-expired");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_unknown_action_response() {
        let json = serde_json::to_value(CommandResponse::unknown_action()).unwrap();
        assert_eq!(json, json!({ "success": false, "error": "Unknown action" }));
    }

    #[test]
    fn test_failed_import_keeps_report() {
        let report = ImportReport {
            success: false,
            total_count: 2,
            error: Some("Failed to import any cookies: expired".to_string()),
            ..ImportReport::default()
        };

        let response = CommandResponse::from_import(report);
        assert!(!response.success);
        assert_eq!(response.error_code, Some(ErrorCode::SessionExpired));
        assert_eq!(response.data.unwrap()["totalCount"], 2);
    }
}
