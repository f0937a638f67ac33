//! Sharing protocol
//!
//! State machine per token: `active -> accessed* -> revoked | expired`.
//! One-time tokens are consumed by their first successful access.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

use tabvault_cookies::CookieTransport;
use tabvault_model::{HostContext, Session};
use tabvault_security::{generate_share_token, SecurityManager};
use tabvault_session::{collect_tab_cookies, reopen_tabs, SessionStore};
use tabvault_storage::{keys, KeyValueStore};

use crate::error::SharingError;
use crate::history::{recent_accesses, AccessEntry, ACCESS_WARNING_THRESHOLD};
use crate::package::{ShareMeta, SharePackage, ShareSummary, SharedRecord};
use crate::registry::TokenRegistry;
use crate::Result;

const LARGE_SESSION_TABS: usize = 50;
const LARGE_SESSION_COOKIES: usize = 100;

/// Longest lifetime a share may be given
pub const MAX_SHARE_TTL_HOURS: i64 = 24 * 365;

fn sensitive_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)(bank|paypal|password|login|sign-?in|account|admin|checkout|billing|wallet)")
            .expect("sensitive keyword regex must compile")
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShareOptions {
    pub encrypt: bool,
    pub include_cookies: bool,
    pub one_time: bool,
    /// Overrides the default lifetime
    pub expires_in_hours: Option<i64>,
}

impl Default for ShareOptions {
    fn default() -> Self {
        Self {
            encrypt: true,
            include_cookies: true,
            one_time: false,
            expires_in_hours: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResult {
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResult {
    pub session_name: String,
    pub successful_tabs: usize,
    pub tab_count: usize,
    pub warnings: Vec<String>,
}

pub struct SharingProtocol {
    sessions: SessionStore,
    store: Arc<dyn KeyValueStore>,
    registry: Option<Arc<dyn TokenRegistry>>,
    security: SecurityManager,
    host: HostContext,
    cookies: CookieTransport,
    share_ttl: Duration,
}

impl SharingProtocol {
    pub fn new(
        sessions: SessionStore,
        store: Arc<dyn KeyValueStore>,
        security: SecurityManager,
        host: HostContext,
        cookies: CookieTransport,
        share_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            store,
            registry: None,
            security,
            host,
            cookies,
            share_ttl,
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn TokenRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Package a stored session under a new token.
    pub async fn share(&self, session_id: &str, options: &ShareOptions) -> Result<ShareResult> {
        self.expiry(self.host.clock.now(), options.expires_in_hours)?;

        let session = self.sessions.load(session_id).await?.session;
        let mut warnings = pre_share_warnings(&session);

        let cookies = if options.include_cookies {
            collect_tab_cookies(&self.host, &session.tabs).await
        } else {
            Vec::new()
        };
        let package = SharePackage::new(session, cookies);
        if package.metadata.cookie_count > LARGE_SESSION_COOKIES {
            warnings.push(format!(
                "Session includes {} cookies",
                package.metadata.cookie_count
            ));
        }

        let now = self.host.clock.now();
        let expires_at = self.expiry(now, options.expires_in_hours)?;
        let token = generate_share_token(now);

        let meta = ShareMeta {
            token: token.clone(),
            session_id: package.session.id.clone(),
            session_name: package.session.name.clone(),
            created_at: now,
            expires_at,
            one_time: options.one_time,
            encrypted: options.encrypt,
            tab_count: package.metadata.tab_count,
            cookie_count: package.metadata.cookie_count,
        };

        let (package, envelope) = if options.encrypt {
            (None, Some(self.security.encrypt_portable(&package)?))
        } else {
            (Some(package), None)
        };
        let record = SharedRecord {
            token: token.clone(),
            created_at: now,
            expires_at: meta.expires_at,
            one_time: options.one_time,
            package,
            envelope,
        };

        self.store
            .set(vec![
                (token.clone(), serde_json::to_value(&record)?),
                (keys::share_meta(&token), serde_json::to_value(&meta)?),
            ])
            .await?;

        if let Some(registry) = &self.registry {
            if let Err(e) = registry.store(&token, &record).await {
                tracing::warn!(token = %token, error = %e, "Failed to publish share token");
                warnings.push(format!("Share is only available on this device: {e}"));
            }
        }

        tracing::info!(
            token = %token,
            session_id = %meta.session_id,
            tab_count = meta.tab_count,
            cookie_count = meta.cookie_count,
            encrypted = meta.encrypted,
            one_time = meta.one_time,
            "Shared session"
        );

        Ok(ShareResult {
            token,
            expires_at: meta.expires_at,
            warnings,
        })
    }

    /// Open a shared session: apply its cookies, then reopen its tabs.
    pub async fn access(&self, token: &str, accessor: Option<&str>) -> Result<AccessResult> {
        self.security.validate_share_token(token)?;

        let record = self.fetch(token).await?.ok_or(SharingError::NotFound)?;
        let now = self.host.clock.now();

        let package = match (&record.package, &record.envelope) {
            (_, Some(envelope)) => self.security.decrypt::<SharePackage>(envelope)?,
            (Some(package), None) => package.clone(),
            (None, None) => {
                return Err(SharingError::InvalidPackage(
                    "record carries no session data".to_string(),
                ))
            }
        };

        let mut warnings = self
            .record_access(&package.session.id, token, accessor)
            .await?;

        self.security.validate_session(&package.session)?;
        if package.cookies.len() != package.session.tab_count() && !package.cookies.is_empty() {
            return Err(SharingError::InvalidPackage(
                "cookie lists do not line up with tabs".to_string(),
            ));
        }

        if record.is_expired(now) {
            if record.one_time {
                self.remove_everywhere(token).await?;
            }
            tracing::info!(token = %token, one_time = record.one_time, "Shared session expired");
            return Err(SharingError::Expired);
        }

        let cookies: Vec<_> = package
            .cookies
            .iter()
            .flat_map(|tab| tab.cookies.iter().cloned())
            .collect();
        if !cookies.is_empty() {
            let report = self.cookies.reimport_cookies(cookies).await;
            warnings.extend(report.warnings);
            if let Some(error) = report.error {
                warnings.push(error);
            }
        }

        let (successful_tabs, tab_warnings) =
            reopen_tabs(&self.host, &package.session.tabs).await;
        warnings.extend(tab_warnings);

        if record.one_time {
            self.remove_everywhere(token).await?;
            tracing::info!(token = %token, "Consumed one-time share");
        }

        tracing::info!(
            token = %token,
            tabs = successful_tabs,
            tab_count = package.session.tab_count(),
            "Accessed shared session"
        );

        Ok(AccessResult {
            session_name: package.session.name.clone(),
            successful_tabs,
            tab_count: package.session.tab_count(),
            warnings,
        })
    }

    /// Withdraw a share locally and from the registry. Idempotent.
    pub async fn revoke(&self, token: &str) -> Result<()> {
        self.security.validate_share_token(token)?;
        self.remove_everywhere(token).await?;

        tracing::info!(token = %token, "Revoked share");
        Ok(())
    }

    /// Shares created on this device, newest first
    pub async fn list(&self) -> Result<Vec<ShareSummary>> {
        let now = self.host.clock.now();
        let mut summaries: Vec<ShareSummary> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|(key, _)| {
                key.starts_with(keys::SHARE_PREFIX) && key.ends_with(keys::META_SUFFIX)
            })
            .filter_map(|(_, value)| serde_json::from_value::<ShareMeta>(value).ok())
            .map(|meta| ShareSummary {
                is_expired: now > meta.expires_at,
                meta,
            })
            .collect();
        summaries.sort_by(|a, b| b.meta.created_at.cmp(&a.meta.created_at));
        Ok(summaries)
    }

    /// Local store first, then the registry. Registry failures count as a miss.
    async fn fetch(&self, token: &str) -> Result<Option<SharedRecord>> {
        if let Some(value) = self.store.get(token).await? {
            return Ok(Some(serde_json::from_value(value)?));
        }

        let Some(registry) = &self.registry else {
            return Ok(None);
        };
        match registry.get(token).await {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::warn!(token = %token, error = %e, "Token registry lookup failed");
                Ok(None)
            }
        }
    }

    /// Append to the session's access log. Returns a warning when the share
    /// is being opened unusually often.
    async fn record_access(
        &self,
        session_id: &str,
        token: &str,
        accessor: Option<&str>,
    ) -> Result<Vec<String>> {
        let key = keys::access_history(session_id);
        let now = self.host.clock.now();

        let mut history: Vec<AccessEntry> = match self.store.get(&key).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => Vec::new(),
        };
        history.push(AccessEntry {
            timestamp: now,
            token: token.to_string(),
            accessor: accessor.map(str::to_string),
        });
        self.store
            .set_one(&key, serde_json::to_value(&history)?)
            .await?;

        let recent = recent_accesses(&history, now);
        if recent >= ACCESS_WARNING_THRESHOLD {
            tracing::warn!(
                session_id = %session_id,
                accesses = recent,
                "Unusual share access pattern"
            );
            return Ok(vec![format!(
                "Shared session accessed {recent} times in the last hour"
            )]);
        }
        Ok(Vec::new())
    }

    /// Expiry for a share created at `now`. Non-positive requests fall back
    /// to the default lifetime.
    fn expiry(&self, now: DateTime<Utc>, requested_hours: Option<i64>) -> Result<DateTime<Utc>> {
        let ttl = match requested_hours {
            Some(hours) if hours > MAX_SHARE_TTL_HOURS => {
                return Err(SharingError::InvalidLifetime(hours))
            }
            Some(hours) if hours > 0 => {
                Duration::try_hours(hours).ok_or(SharingError::InvalidLifetime(hours))?
            }
            _ => self.share_ttl,
        };
        now.checked_add_signed(ttl)
            .ok_or(SharingError::InvalidLifetime(ttl.num_hours()))
    }

    async fn remove_everywhere(&self, token: &str) -> Result<()> {
        self.store
            .remove(&[token.to_string(), keys::share_meta(token)])
            .await?;

        if let Some(registry) = &self.registry {
            if let Err(e) = registry.revoke(token).await {
                tracing::warn!(token = %token, error = %e, "Failed to revoke token in registry");
            }
        }
        Ok(())
    }
}

fn pre_share_warnings(session: &Session) -> Vec<String> {
    let mut warnings = Vec::new();

    if session
        .tabs
        .iter()
        .any(|tab| sensitive_regex().is_match(&tab.title) || sensitive_regex().is_match(&tab.url))
    {
        warnings.push("Session contains pages that may hold sensitive information".to_string());
    }
    if session.tab_count() > LARGE_SESSION_TABS {
        warnings.push(format!(
            "Large session ({} tabs) may be slow to open",
            session.tab_count()
        ));
    }

    warnings
}
