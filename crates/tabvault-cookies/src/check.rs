//! Per-cookie admission checks
//!
//! Checks run in a fixed order and stop at the first failure:
//! required fields, expiry, secure-context, size.

use tabvault_model::{Cookie, MAX_COOKIE_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieRejection {
    MissingFields,
    Expired,
    InsecureContext,
    TooLarge,
}

impl CookieRejection {
    pub fn reason(&self) -> String {
        match self {
            CookieRejection::MissingFields => "Missing required fields (name, domain)".to_string(),
            CookieRejection::Expired => "Cookie has expired".to_string(),
            CookieRejection::InsecureContext => {
                "Secure cookie cannot be set over an insecure connection".to_string()
            }
            CookieRejection::TooLarge => {
                format!("Cookie exceeds the maximum size of {MAX_COOKIE_BYTES} bytes")
            }
        }
    }
}

pub fn check_cookie(
    cookie: &Cookie,
    now_secs: f64,
    secure_context: bool,
) -> Result<(), CookieRejection> {
    if cookie.name.trim().is_empty() || cookie.domain.trim().is_empty() {
        return Err(CookieRejection::MissingFields);
    }
    if cookie.is_expired(now_secs) {
        return Err(CookieRejection::Expired);
    }
    if cookie.secure && !secure_context {
        return Err(CookieRejection::InsecureContext);
    }
    if cookie.byte_size() > MAX_COOKIE_BYTES {
        return Err(CookieRejection::TooLarge);
    }
    Ok(())
}
