//! Session data structure

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tab::Tab;

pub const DEFAULT_SESSION_TTL_DAYS: i64 = 30;

/// A named, persisted bundle of tabs.
///
/// Every field deserializes leniently so that records written by older or
/// foreign clients can still be read and then judged by validation instead of
/// failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tabs: Vec<Tab>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "initial_version")]
    pub version: u64,
    #[serde(default)]
    pub encrypted: bool,
}

fn initial_version() -> u64 {
    1
}

impl Session {
    pub fn new(name: impl Into<String>, category: impl Into<String>, tabs: Vec<Tab>) -> Self {
        let now = Utc::now();

        Self {
            id: String::new(),
            name: name.into(),
            tabs,
            category: category.into(),
            favorite: false,
            created_at: Some(now),
            expires_at: Some(now + Duration::days(DEFAULT_SESSION_TTL_DAYS)),
            version: initial_version(),
            encrypted: false,
        }
    }

    /// Storage id for a new session
    pub fn generate_id() -> String {
        format!("session_{}", Uuid::new_v4())
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires < now)
    }

    /// Case-insensitive match over name, category, tab titles and urls.
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.category.to_lowercase().contains(needle)
            || self.tabs.iter().any(|tab| {
                tab.title.to_lowercase().contains(needle) || tab.url.to_lowercase().contains(needle)
            })
    }
}
