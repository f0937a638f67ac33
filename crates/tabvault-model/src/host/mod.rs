//! Host collaborator interfaces
//!
//! The browser owns the cookie jar, the open tabs and the notification
//! surface. The engine only talks to them through these traits; every call is
//! asynchronous and may fail independently.

mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::cookie::Cookie;

pub use memory::{MemoryCookieJar, MemoryHost, MemoryNotifier, MemoryTabHost};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Rejected by host: {0}")]
    Rejected(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Host unavailable: {0}")]
    Unavailable(String),
}

/// Selects cookies from the jar. Empty filter selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieFilter {
    /// Cookies whose domain is this domain or a subdomain of it
    pub domain: Option<String>,
    /// Cookies that would be sent to this URL
    pub url: Option<String>,
}

impl CookieFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            url: None,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            domain: None,
            url: Some(url.into()),
        }
    }
}

#[async_trait]
pub trait CookieJar: Send + Sync {
    async fn get_all(&self, filter: &CookieFilter) -> Result<Vec<Cookie>, HostError>;

    async fn set(&self, cookie: &Cookie) -> Result<(), HostError>;

    async fn remove(&self, url: &str, name: &str) -> Result<(), HostError>;
}

/// A tab currently open in the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenTab {
    pub id: u64,
    pub url: String,
}

#[async_trait]
pub trait TabHost: Send + Sync {
    /// Open tabs, optionally restricted to those whose url contains `url_filter`
    async fn query(&self, url_filter: Option<&str>) -> Result<Vec<OpenTab>, HostError>;

    async fn create(&self, url: &str) -> Result<OpenTab, HostError>;

    async fn reload(&self, tab_id: u64) -> Result<(), HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
}

impl Notification {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        priority: NotificationPriority,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            priority,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, id: &str, notification: &Notification) -> Result<(), HostError>;
}

/// The host collaborators handed to every engine component
#[derive(Clone)]
pub struct HostContext {
    pub cookies: Arc<dyn CookieJar>,
    pub tabs: Arc<dyn TabHost>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}
