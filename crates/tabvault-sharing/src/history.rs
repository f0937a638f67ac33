//! Per-session share access log

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Accesses within an hour at which a warning is raised
pub const ACCESS_WARNING_THRESHOLD: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEntry {
    pub timestamp: DateTime<Utc>,
    pub token: String,
    /// Free-form description of who accessed, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessor: Option<String>,
}

/// Entries newer than one hour before `now`
pub fn recent_accesses(history: &[AccessEntry], now: DateTime<Utc>) -> usize {
    let since = now - Duration::hours(1);
    history.iter().filter(|e| e.timestamp > since).count()
}
