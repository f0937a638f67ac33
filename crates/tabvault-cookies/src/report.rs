//! Structured results returned by the cookie transport

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tabvault_model::Cookie;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// True when at least one cookie reached the jar
    pub success: bool,
    pub success_count: usize,
    pub total_count: usize,
    /// One entry per rejected cookie
    pub warnings: Vec<String>,
    /// Aggregate failure, set only when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Domains that received at least one cookie
    #[serde(default)]
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub removed: usize,
    pub failed: usize,
}

/// A jar snapshot persisted by `backup_cookies`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieBackup {
    pub domain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub cookies: Vec<Cookie>,
}
