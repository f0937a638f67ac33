//! Shared package layout

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tabvault_model::Session;
use tabvault_security::EncryptionEnvelope;
use tabvault_session::TabCookies;

pub const PACKAGE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareMetadata {
    pub version: u32,
    pub tab_count: usize,
    pub cookie_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePackage {
    pub session: Session,
    /// One entry per tab, in tab order
    pub cookies: Vec<TabCookies>,
    pub metadata: ShareMetadata,
}

impl SharePackage {
    pub fn new(session: Session, cookies: Vec<TabCookies>) -> Self {
        let metadata = ShareMetadata {
            version: PACKAGE_VERSION,
            tab_count: session.tab_count(),
            cookie_count: cookies.iter().map(|t| t.cookies.len()).sum(),
        };
        Self {
            session,
            cookies,
            metadata,
        }
    }
}

/// What is stored under the token, locally and in the registry.
/// Exactly one of `package` and `envelope` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedRecord {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub one_time: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<SharePackage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EncryptionEnvelope>,
}

impl SharedRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Local bookkeeping for a share created on this device, under `<token>_meta`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareMeta {
    pub token: String,
    pub session_id: String,
    pub session_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub one_time: bool,
    pub encrypted: bool,
    pub tab_count: usize,
    pub cookie_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareSummary {
    #[serde(flatten)]
    pub meta: ShareMeta,
    pub is_expired: bool,
}
