//! Session and domain validation

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use tabvault_model::Session;

use crate::error::SecurityError;
use crate::Result;

fn domain_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)^\.?([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)*[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$")
            .expect("domain regex must compile")
    })
}

/// Check every required field and every tab url, reporting all problems at once.
pub fn validate_session(session: &Session) -> Result<()> {
    let mut missing = Vec::new();
    let mut invalid = Vec::new();

    if session.name.trim().is_empty() {
        missing.push("name".to_string());
    }
    if session.tabs.is_empty() {
        missing.push("tabs".to_string());
    }
    if session.created_at.is_none() {
        missing.push("createdAt".to_string());
    }
    if session.category.trim().is_empty() {
        missing.push("category".to_string());
    }

    for (index, tab) in session.tabs.iter().enumerate() {
        if let Err(e) = Url::parse(&tab.url) {
            invalid.push(format!("tab {} has an invalid url ({})", index, e));
        }
    }

    if let (Some(created), Some(expires)) = (session.created_at, session.expires_at) {
        if expires <= created {
            invalid.push("expiresAt must be after createdAt".to_string());
        }
    }

    if missing.is_empty() && invalid.is_empty() {
        Ok(())
    } else {
        Err(SecurityError::Validation { missing, invalid })
    }
}

/// Cookie-style domain syntax: optional leading dot, dot-separated DNS labels.
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() || domain.len() > 253 || !domain_regex().is_match(domain) {
        return Err(SecurityError::InvalidDomain(domain.to_string()));
    }
    Ok(())
}
