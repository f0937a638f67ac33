//! Storage key layout
//!
//! ```text
//! session_<uuid>                 live session record
//! backup_<sessionId>_<millis>    point-in-time copy of a session record
//! quarantine_<sessionId>         record that failed an integrity check
//! access_history_<sessionId>     share access log
//! cookies_<sessionId>            per-tab cookie package for a session
//! cookie_backup_<domain|all>     cookie jar snapshot
//! tombstone_<sessionId>          marker left by a delete, read by sync
//! categories                     category list
//! share_<ts>_<rand>              share package, plus `<token>_meta`
//! ```

pub const SESSION_PREFIX: &str = "session_";
pub const BACKUP_PREFIX: &str = "backup_";
pub const QUARANTINE_PREFIX: &str = "quarantine_";
pub const ACCESS_HISTORY_PREFIX: &str = "access_history_";
pub const COOKIE_PACKAGE_PREFIX: &str = "cookies_";
pub const COOKIE_BACKUP_PREFIX: &str = "cookie_backup_";
pub const TOMBSTONE_PREFIX: &str = "tombstone_";
pub const CATEGORIES: &str = "categories";
pub const SHARE_PREFIX: &str = "share_";
pub const META_SUFFIX: &str = "_meta";

pub fn is_session_key(key: &str) -> bool {
    key.starts_with(SESSION_PREFIX)
}

pub fn backup(session_id: &str, millis: i64) -> String {
    format!("{BACKUP_PREFIX}{session_id}_{millis}")
}

/// Prefix matching every backup of `session_id`.
pub fn backup_prefix(session_id: &str) -> String {
    format!("{BACKUP_PREFIX}{session_id}_")
}

pub fn quarantine(session_id: &str) -> String {
    format!("{QUARANTINE_PREFIX}{session_id}")
}

pub fn access_history(session_id: &str) -> String {
    format!("{ACCESS_HISTORY_PREFIX}{session_id}")
}

pub fn cookie_package(session_id: &str) -> String {
    format!("{COOKIE_PACKAGE_PREFIX}{session_id}")
}

pub fn cookie_backup(domain: Option<&str>) -> String {
    format!("{COOKIE_BACKUP_PREFIX}{}", domain.unwrap_or("all"))
}

pub fn tombstone(session_id: &str) -> String {
    format!("{TOMBSTONE_PREFIX}{session_id}")
}

pub fn share_meta(token: &str) -> String {
    format!("{token}{META_SUFFIX}")
}
