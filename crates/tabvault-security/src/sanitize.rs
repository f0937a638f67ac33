//! Session sanitization

use chrono::Duration;

use tabvault_model::{Session, DEFAULT_SESSION_TTL_DAYS};

pub const MAX_SESSION_LIFETIME_DAYS: i64 = 365;

/// Remove markup delimiters so stored text can never open a tag when rendered
pub fn sanitize_text(input: &str) -> String {
    input.chars().filter(|c| !matches!(c, '<' | '>')).collect()
}

/// Strip markup from user-visible strings and normalise `expires_at`.
///
/// A missing or non-positive lifetime becomes the default lifetime; anything
/// beyond the maximum lifetime is clamped. `created_at` is left untouched so
/// validation can still report it missing.
pub fn sanitize_session(mut session: Session) -> Session {
    session.name = sanitize_text(session.name.trim());
    session.category = sanitize_text(session.category.trim());
    for tab in &mut session.tabs {
        tab.title = sanitize_text(&tab.title);
        tab.url = tab.url.trim().to_string();
    }

    if let Some(created) = session.created_at {
        let max = created + Duration::days(MAX_SESSION_LIFETIME_DAYS);
        session.expires_at = match session.expires_at {
            Some(expires) if expires <= created => {
                Some(created + Duration::days(DEFAULT_SESSION_TTL_DAYS))
            }
            Some(expires) => Some(expires.min(max)),
            None => Some(created + Duration::days(DEFAULT_SESSION_TTL_DAYS)),
        };
    }

    session
}
