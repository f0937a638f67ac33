//! Cookie transport

use std::collections::BTreeSet;
use std::sync::Arc;

use tabvault_model::{domain_matches, Cookie, CookieFilter, HostContext};
use tabvault_security::validate_domain;
use tabvault_storage::{keys, KeyValueStore};

use crate::check::check_cookie;
use crate::error::CookieError;
use crate::report::{ClearReport, CookieBackup, ImportReport};
use crate::Result;

/// Jar rejections after which a large batch is abandoned
pub const RATE_LIMIT_REJECTIONS: usize = 10;

const ALL_FAILED: &str = "All cookies failed to import";
const RATE_LIMITED: &str = "Rate limit exceeded";

pub struct CookieTransport {
    host: HostContext,
    store: Arc<dyn KeyValueStore>,
    /// Whether the importing context is served over https
    secure_context: bool,
}

impl CookieTransport {
    pub fn new(store: Arc<dyn KeyValueStore>, host: HostContext, secure_context: bool) -> Self {
        Self {
            host,
            store,
            secure_context,
        }
    }

    /// Import a batch of cookies into the jar.
    ///
    /// Never fails outright: the report says how many cookies landed, why the
    /// others did not, and carries an aggregate error when none landed.
    pub async fn import_cookies(&self, cookies: &[Cookie]) -> ImportReport {
        let total = cookies.len();
        let mut report = ImportReport {
            total_count: total,
            ..ImportReport::default()
        };

        if cookies.is_empty() {
            report.error = Some("No cookies to import".to_string());
            return report;
        }

        let now_secs = self.host.clock.now().timestamp_millis() as f64 / 1000.0;
        let mut reasons: Vec<String> = Vec::new();
        let mut domains = BTreeSet::new();
        let mut jar_rejections = 0usize;

        for (index, cookie) in cookies.iter().enumerate() {
            let label = if cookie.name.is_empty() {
                format!("cookie #{index}")
            } else {
                cookie.name.clone()
            };

            if let Err(rejection) = check_cookie(cookie, now_secs, self.secure_context) {
                let reason = rejection.reason();
                tracing::debug!(cookie = %label, reason = %reason, "Rejected cookie");
                report.warnings.push(format!("{label}: {reason}"));
                reasons.push(reason);
                continue;
            }

            let mut encoded = cookie.clone();
            encoded.name = urlencoding::encode(&cookie.name).into_owned();
            encoded.value = urlencoding::encode(&cookie.value).into_owned();

            match self.host.cookies.set(&encoded).await {
                Ok(()) => {
                    report.success_count += 1;
                    domains.insert(cookie.host_domain());
                }
                Err(e) => {
                    jar_rejections += 1;
                    let reason = e.to_string();
                    report.warnings.push(format!("{label}: {reason}"));
                    reasons.push(reason);

                    if jar_rejections >= RATE_LIMIT_REJECTIONS && total > RATE_LIMIT_REJECTIONS {
                        tracing::warn!(
                            rejected = jar_rejections,
                            total = total,
                            "Cookie jar is rejecting writes, aborting import"
                        );
                        report.success = false;
                        report.error = Some(RATE_LIMITED.to_string());
                        report.domains = domains.into_iter().collect();
                        self.reload_matching_tabs(&report.domains).await;
                        return report;
                    }
                }
            }
        }

        report.domains = domains.into_iter().collect();
        report.success = report.success_count > 0;

        if report.success {
            tracing::info!(
                imported = report.success_count,
                total = total,
                "Imported cookies"
            );
            self.reload_matching_tabs(&report.domains).await;
        } else {
            let first = reasons.first().cloned().unwrap_or_default();
            let homogeneous = reasons.iter().all(|r| *r == first);
            report.error = Some(if homogeneous && !first.is_empty() {
                first
            } else {
                ALL_FAILED.to_string()
            });
        }

        report
    }

    /// Reload open tabs showing a domain that just received cookies.
    /// Failures are logged only.
    async fn reload_matching_tabs(&self, domains: &[String]) {
        let open = match self.host.tabs.query(None).await {
            Ok(open) => open,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list tabs for reload");
                return;
            }
        };

        for tab in open {
            let Some(host) = url::Url::parse(&tab.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
            else {
                continue;
            };

            if domains.iter().any(|d| domain_matches(d, &host)) {
                if let Err(e) = self.host.tabs.reload(tab.id).await {
                    tracing::warn!(tab_id = tab.id, error = %e, "Failed to reload tab");
                }
            }
        }
    }

    pub async fn export_cookies(&self, domain: &str) -> Result<Vec<Cookie>> {
        validate_domain(domain).map_err(|_| CookieError::InvalidDomain(domain.to_string()))?;
        Ok(self.host.cookies.get_all(&CookieFilter::domain(domain)).await?)
    }

    pub async fn clear_cookies(&self, domain: &str) -> Result<ClearReport> {
        let cookies = self.export_cookies(domain).await?;
        let mut report = ClearReport::default();

        for cookie in cookies {
            match self.host.cookies.remove(&cookie.url(), &cookie.name).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!(cookie = %cookie.name, error = %e, "Failed to remove cookie");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(domain = %domain, removed = report.removed, "Cleared cookies");
        Ok(report)
    }

    /// Distinct cookie domains currently in the jar, sorted
    pub async fn get_domains(&self) -> Result<Vec<String>> {
        let cookies = self.host.cookies.get_all(&CookieFilter::all()).await?;
        let domains: BTreeSet<String> = cookies.iter().map(Cookie::host_domain).collect();
        Ok(domains.into_iter().collect())
    }

    /// Snapshot the jar (or one domain of it) into the store
    pub async fn backup_cookies(&self, domain: Option<&str>) -> Result<CookieBackup> {
        let cookies = match domain {
            Some(domain) => self.export_cookies(domain).await?,
            None => self.host.cookies.get_all(&CookieFilter::all()).await?,
        };

        let backup = CookieBackup {
            domain: domain.map(str::to_string),
            created_at: self.host.clock.now(),
            cookies,
        };
        self.store
            .set_one(&keys::cookie_backup(domain), serde_json::to_value(&backup)?)
            .await?;

        tracing::info!(
            domain = domain.unwrap_or("all"),
            count = backup.cookies.len(),
            "Backed up cookies"
        );
        Ok(backup)
    }

    /// Re-import a snapshot written by `backup_cookies`
    pub async fn restore_cookies(&self, domain: Option<&str>) -> Result<ImportReport> {
        let key = keys::cookie_backup(domain);
        let value = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| CookieError::BackupNotFound(domain.unwrap_or("all").to_string()))?;
        let backup: CookieBackup = serde_json::from_value(value)?;

        Ok(self.reimport_cookies(backup.cookies).await)
    }

    /// Import cookies that were read out of a jar, whose names and values are
    /// already percent-encoded.
    pub async fn reimport_cookies(&self, cookies: Vec<Cookie>) -> ImportReport {
        let cookies: Vec<Cookie> = cookies.into_iter().map(decoded).collect();
        self.import_cookies(&cookies).await
    }
}

impl Clone for CookieTransport {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            store: Arc::clone(&self.store),
            secure_context: self.secure_context,
        }
    }
}

fn decoded(mut cookie: Cookie) -> Cookie {
    if let Ok(name) = urlencoding::decode(&cookie.name) {
        cookie.name = name.into_owned();
    }
    if let Ok(value) = urlencoding::decode(&cookie.value) {
        cookie.value = value.into_owned();
    }
    cookie
}
