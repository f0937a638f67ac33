//! Results returned by the session store

use serde::{Deserialize, Serialize};

use tabvault_cookies::ImportReport;
use tabvault_model::Session;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedSession {
    pub session: Session,
    /// The live record was unreadable and this copy came from a backup
    pub recovered_from_backup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_warning: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub expired: usize,
    pub quarantined: usize,
    pub backups_pruned: usize,
}

/// Per-record result of `import_all`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedWithCookies {
    pub session: Session,
    pub cookie_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub session_id: String,
    pub tab_count: usize,
    pub successful_tabs: usize,
    /// Absent when the package held no cookies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<ImportReport>,
    pub warnings: Vec<String>,
}
