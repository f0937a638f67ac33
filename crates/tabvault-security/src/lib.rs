//! TabVault Security
//!
//! Pure transforms used by every other component: AES-256-GCM envelopes,
//! session validation and sanitization, share token and domain syntax checks.
//! Nothing here touches storage or the host.

mod crypto;
mod envelope;
mod error;
mod manager;
mod sanitize;
mod token;
mod validation;

pub use crypto::{SecureKey, KEY_SIZE, NONCE_SIZE};
pub use envelope::EncryptionEnvelope;
pub use error::SecurityError;
pub use manager::SecurityManager;
pub use sanitize::{sanitize_session, sanitize_text, MAX_SESSION_LIFETIME_DAYS};
pub use token::{generate_share_token, validate_share_token, SHARE_TOKEN_PREFIX};
pub use validation::{validate_domain, validate_session};

pub type Result<T> = std::result::Result<T, SecurityError>;
