//! Cookie data structure
//!
//! Field names follow the host cookie API so packages exchanged with other
//! devices stay readable by the browser-side code.

use serde::{Deserialize, Serialize};

/// Largest serialized cookie accepted by the jar
pub const MAX_COOKIE_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    NoRestriction,
    Lax,
    Strict,
    #[default]
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: SameSite,
    /// Seconds since the epoch; `None` for session cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
}

fn default_path() -> String {
    "/".to_string()
}

impl Cookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            secure: false,
            http_only: false,
            same_site: SameSite::Unspecified,
            expiration_date: None,
        }
    }

    pub fn is_session(&self) -> bool {
        self.expiration_date.is_none()
    }

    pub fn is_expired(&self, now_secs: f64) -> bool {
        self.expiration_date.is_some_and(|expires| expires < now_secs)
    }

    /// Size of the cookie as it is serialized for storage and transport
    pub fn byte_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    /// Domain without the leading dot, lowercased
    pub fn host_domain(&self) -> String {
        self.domain.trim_start_matches('.').to_lowercase()
    }

    /// Domain-match per RFC 6265: exact host or a subdomain of it
    pub fn matches_host(&self, host: &str) -> bool {
        domain_matches(&self.host_domain(), host)
    }

    /// URL the host cookie API needs to address this cookie
    pub fn url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}{}", scheme, self.host_domain(), self.path)
    }
}

/// True if `host` equals `domain` or is one of its subdomains
pub fn domain_matches(domain: &str, host: &str) -> bool {
    let host = host.to_lowercase();
    let domain = domain.trim_start_matches('.').to_lowercase();
    !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
}
