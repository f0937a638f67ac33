//! Per-tab cookie packages

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use tabvault_model::{Cookie, CookieFilter, HostContext, Session, Tab};
use tabvault_security::EncryptionEnvelope;
use tabvault_storage::keys;

use crate::error::SessionError;
use crate::report::{RestoreReport, SavedWithCookies};
use crate::store::SessionStore;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabCookies {
    pub url: String,
    pub cookies: Vec<Cookie>,
}

/// Cookies captured alongside a session, one list per tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookiePackage {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub tabs: Vec<TabCookies>,
}

impl CookiePackage {
    pub fn cookie_count(&self) -> usize {
        self.tabs.iter().map(|t| t.cookies.len()).sum()
    }

    /// Every captured cookie, deduplicated by (name, domain, path)
    pub fn cookies(&self) -> Vec<Cookie> {
        let mut seen = std::collections::HashSet::new();
        self.tabs
            .iter()
            .flat_map(|t| t.cookies.iter())
            .filter(|c| seen.insert((c.name.clone(), c.host_domain(), c.path.clone())))
            .cloned()
            .collect()
    }
}

/// Read the cookies each tab would send, all tabs at once.
/// A tab whose lookup fails contributes an empty list.
pub async fn collect_tab_cookies(host: &HostContext, tabs: &[Tab]) -> Vec<TabCookies> {
    let lookups = tabs.iter().map(|tab| async move {
        let cookies = match host.cookies.get_all(&CookieFilter::url(&tab.url)).await {
            Ok(cookies) => cookies,
            Err(e) => {
                tracing::warn!(url = %tab.url, error = %e, "Could not read cookies for tab");
                Vec::new()
            }
        };
        TabCookies {
            url: tab.url.clone(),
            cookies,
        }
    });

    join_all(lookups).await
}

/// Open every tab in order. Returns how many opened and a warning per failure.
pub async fn reopen_tabs(host: &HostContext, tabs: &[Tab]) -> (usize, Vec<String>) {
    let mut opened = 0;
    let mut warnings = Vec::new();

    for tab in tabs {
        match host.tabs.create(&tab.url).await {
            Ok(_) => opened += 1,
            Err(e) => {
                tracing::warn!(url = %tab.url, error = %e, "Failed to open tab");
                warnings.push(format!("Failed to open {}: {}", tab.url, e));
            }
        }
    }

    (opened, warnings)
}

impl SessionStore {
    /// Save the session, then capture each tab's cookies into an encrypted
    /// package stored beside it.
    pub async fn save_with_cookies(&self, session: Session) -> Result<SavedWithCookies> {
        let session = self.save(session).await?;

        let package = CookiePackage {
            session_id: session.id.clone(),
            created_at: self.now(),
            tabs: collect_tab_cookies(&self.host, &session.tabs).await,
        };
        let cookie_count = package.cookie_count();
        let envelope = self.security.encrypt(&package)?;
        self.store
            .set_one(
                &keys::cookie_package(&session.id),
                serde_json::to_value(&envelope)?,
            )
            .await?;

        tracing::info!(
            session_id = %session.id,
            cookie_count = cookie_count,
            "Saved session with cookies"
        );
        Ok(SavedWithCookies {
            session,
            cookie_count,
        })
    }

    /// Re-apply a session's saved cookies, then reopen its tabs.
    pub async fn restore_with_cookies(&self, id: &str) -> Result<RestoreReport> {
        let loaded = self.load(id).await?;
        let session = loaded.session;

        let value = self
            .store
            .get(&keys::cookie_package(id))
            .await?
            .ok_or_else(|| SessionError::NoCookiePackage(id.to_string()))?;
        let envelope: EncryptionEnvelope = serde_json::from_value(value)?;
        let package: CookiePackage = self.security.decrypt(&envelope)?;

        let mut warnings: Vec<String> = loaded.expiry_warning.into_iter().collect();

        let cookies = package.cookies();
        let cookie_report = if cookies.is_empty() {
            None
        } else {
            let report = self.cookies.reimport_cookies(cookies).await;
            warnings.extend(report.warnings.iter().cloned());
            if let Some(error) = &report.error {
                warnings.push(error.clone());
            }
            Some(report)
        };

        let (successful_tabs, tab_warnings) = reopen_tabs(&self.host, &session.tabs).await;
        warnings.extend(tab_warnings);

        tracing::info!(
            session_id = %id,
            tabs = successful_tabs,
            tab_count = session.tab_count(),
            "Restored session with cookies"
        );
        Ok(RestoreReport {
            session_id: session.id.clone(),
            tab_count: session.tab_count(),
            successful_tabs,
            cookies: cookie_report,
            warnings,
        })
    }
}
