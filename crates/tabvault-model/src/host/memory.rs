//! In-process host implementations
//!
//! Used when the engine runs headless (no browser attached) and by tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

use super::{
    CookieFilter, CookieJar, HostContext, HostError, Notification, Notifier, OpenTab, TabHost,
};
use crate::clock::ManualClock;
use crate::cookie::{domain_matches, Cookie};

#[derive(Debug, Default)]
struct JarState {
    cookies: Vec<Cookie>,
    rejecting: bool,
    reject_after: Option<usize>,
    set_calls: usize,
}

/// Cookie jar kept in memory. Cookies are unique per (name, domain, path).
#[derive(Debug, Clone, Default)]
pub struct MemoryCookieJar {
    state: Arc<RwLock<JarState>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail, as a throttling host would
    pub fn set_rejecting(&self, rejecting: bool) {
        self.state.write().rejecting = rejecting;
    }

    /// Accept the next `accepted` writes, then start rejecting
    pub fn reject_after(&self, accepted: usize) {
        let mut state = self.state.write();
        state.reject_after = Some(state.set_calls + accepted);
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        self.state.read().cookies.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `set` calls seen, including rejected ones
    pub fn set_calls(&self) -> usize {
        self.state.read().set_calls
    }

    fn selects(filter: &CookieFilter, cookie: &Cookie) -> bool {
        if let Some(domain) = &filter.domain {
            let cookie_domain = cookie.host_domain();
            if !domain_matches(domain, &cookie_domain) {
                return false;
            }
        }

        if let Some(url) = &filter.url {
            let Ok(parsed) = Url::parse(url) else {
                return false;
            };
            let host = parsed.host_str().unwrap_or_default();
            if !cookie.matches_host(host) || !parsed.path().starts_with(&cookie.path) {
                return false;
            }
            if cookie.secure && parsed.scheme() != "https" {
                return false;
            }
        }

        true
    }
}

#[async_trait]
impl CookieJar for MemoryCookieJar {
    async fn get_all(&self, filter: &CookieFilter) -> Result<Vec<Cookie>, HostError> {
        Ok(self
            .state
            .read()
            .cookies
            .iter()
            .filter(|c| Self::selects(filter, c))
            .cloned()
            .collect())
    }

    async fn set(&self, cookie: &Cookie) -> Result<(), HostError> {
        let mut state = self.state.write();
        state.set_calls += 1;

        if state.rejecting || state.reject_after.is_some_and(|limit| state.set_calls > limit) {
            return Err(HostError::Rejected("cookie write throttled".to_string()));
        }

        state.cookies.retain(|c| {
            !(c.name == cookie.name
                && c.host_domain() == cookie.host_domain()
                && c.path == cookie.path)
        });
        state.cookies.push(cookie.clone());
        Ok(())
    }

    async fn remove(&self, url: &str, name: &str) -> Result<(), HostError> {
        let parsed = Url::parse(url).map_err(|e| HostError::Rejected(e.to_string()))?;
        let host = parsed.host_str().unwrap_or_default().to_lowercase();

        self.state
            .write()
            .cookies
            .retain(|c| !(c.name == name && c.host_domain() == host));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TabState {
    open: Vec<OpenTab>,
    reloaded: Vec<u64>,
    blocked_urls: HashSet<String>,
}

/// Tab host kept in memory. Records reloads for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryTabHost {
    state: Arc<RwLock<TabState>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryTabHost {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Refuse to open this exact url
    pub fn block_url(&self, url: impl Into<String>) {
        self.state.write().blocked_urls.insert(url.into());
    }

    pub fn open_tabs(&self) -> Vec<OpenTab> {
        self.state.read().open.clone()
    }

    pub fn reloaded(&self) -> Vec<u64> {
        self.state.read().reloaded.clone()
    }
}

#[async_trait]
impl TabHost for MemoryTabHost {
    async fn query(&self, url_filter: Option<&str>) -> Result<Vec<OpenTab>, HostError> {
        Ok(self
            .state
            .read()
            .open
            .iter()
            .filter(|t| url_filter.map_or(true, |f| t.url.contains(f)))
            .cloned()
            .collect())
    }

    async fn create(&self, url: &str) -> Result<OpenTab, HostError> {
        let mut state = self.state.write();
        if state.blocked_urls.contains(url) {
            return Err(HostError::Rejected(format!("Cannot open {url}")));
        }

        let tab = OpenTab {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            url: url.to_string(),
        };
        state.open.push(tab.clone());
        Ok(tab)
    }

    async fn reload(&self, tab_id: u64) -> Result<(), HostError> {
        let mut state = self.state.write();
        if !state.open.iter().any(|t| t.id == tab_id) {
            return Err(HostError::Rejected(format!("No tab with id {tab_id}")));
        }
        state.reloaded.push(tab_id);
        Ok(())
    }
}

/// Notifier that records what it was asked to show and logs it
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    shown: Arc<RwLock<Vec<(String, Notification)>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<(String, Notification)> {
        self.shown.read().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn show(&self, id: &str, notification: &Notification) -> Result<(), HostError> {
        tracing::info!(
            id = %id,
            title = %notification.title,
            priority = ?notification.priority,
            "{}",
            notification.message
        );
        self.shown
            .write()
            .push((id.to_string(), notification.clone()));
        Ok(())
    }
}

/// A complete in-memory host with a manual clock.
/// Handles are shared with the context, so tests can inspect what the engine did.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    pub cookies: MemoryCookieJar,
    pub tabs: MemoryTabHost,
    pub notifier: MemoryNotifier,
    pub clock: ManualClock,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            cookies: MemoryCookieJar::new(),
            tabs: MemoryTabHost::new(),
            notifier: MemoryNotifier::new(),
            clock: ManualClock::new(chrono::Utc::now()),
        }
    }

    pub fn context(&self) -> HostContext {
        HostContext {
            cookies: Arc::new(self.cookies.clone()),
            tabs: Arc::new(self.tabs.clone()),
            notifier: Arc::new(self.notifier.clone()),
            clock: Arc::new(self.clock.clone()),
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jar_replaces_same_cookie() {
        let jar = MemoryCookieJar::new();
        jar.set(&Cookie::new("sid", "1", "example.com")).await.unwrap();
        jar.set(&Cookie::new("sid", "2", ".example.com")).await.unwrap();

        let cookies = jar.get_all(&CookieFilter::all()).await.unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "2");
    }

    #[tokio::test]
    async fn test_jar_filters() {
        let jar = MemoryCookieJar::new();
        jar.set(&Cookie::new("a", "1", ".example.com")).await.unwrap();
        jar.set(&Cookie::new("b", "1", "other.org")).await.unwrap();

        let by_domain = jar.get_all(&CookieFilter::domain("example.com")).await.unwrap();
        assert_eq!(by_domain.len(), 1);

        let by_url = jar
            .get_all(&CookieFilter::url("https://www.example.com/x"))
            .await
            .unwrap();
        assert_eq!(by_url[0].name, "a");

        jar.remove("http://other.org/", "b").await.unwrap();
        assert_eq!(jar.len(), 1);
    }

    #[tokio::test]
    async fn test_rejecting_jar() {
        let jar = MemoryCookieJar::new();
        jar.set_rejecting(true);
        assert!(jar.set(&Cookie::new("a", "1", "x.com")).await.is_err());
        assert_eq!(jar.set_calls(), 1);
        assert!(jar.is_empty());

        jar.set_rejecting(false);
        jar.reject_after(1);
        assert!(jar.set(&Cookie::new("a", "1", "x.com")).await.is_ok());
        assert!(jar.set(&Cookie::new("b", "1", "x.com")).await.is_err());
        assert_eq!(jar.len(), 1);
    }

    #[tokio::test]
    async fn test_tab_host() {
        let host = MemoryTabHost::new();
        host.block_url("https://blocked.example");

        let tab = host.create("https://example.com").await.unwrap();
        assert!(host.create("https://blocked.example").await.is_err());

        host.reload(tab.id).await.unwrap();
        assert_eq!(host.reloaded(), vec![tab.id]);
        assert_eq!(host.query(Some("example.com")).await.unwrap().len(), 1);
    }
}
