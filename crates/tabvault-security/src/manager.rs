//! Security manager
//!
//! Stateless apart from the optional master key. Session data at rest is
//! sealed with a fresh data key per record; when a master key is configured
//! the data key is wrapped under it instead of being stored in the clear.
//! Share packages always carry their raw data key because the recipient has
//! no access to this device's master key.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::de::DeserializeOwned;
use serde::Serialize;

use tabvault_model::Session;

use crate::crypto::{self, SecureKey, NONCE_SIZE};
use crate::envelope::EncryptionEnvelope;
use crate::error::SecurityError;
use crate::{sanitize, token, validation, Result};

#[derive(Debug, Clone, Default)]
pub struct SecurityManager {
    master_key: Option<SecureKey>,
}

impl SecurityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_master_key(master_key: SecureKey) -> Self {
        Self {
            master_key: Some(master_key),
        }
    }

    /// Parse a base64-encoded 32-byte master key
    pub fn from_base64_master_key(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SecurityError::InvalidKey(e.to_string()))?;
        Ok(Self::with_master_key(SecureKey::from_slice(&bytes)?))
    }

    pub fn has_master_key(&self) -> bool {
        self.master_key.is_some()
    }

    /// Encrypt a record for storage on this device.
    pub fn encrypt<T: Serialize>(&self, record: &T) -> Result<EncryptionEnvelope> {
        let mut envelope = self.encrypt_portable(record)?;

        let Some(master) = &self.master_key else {
            return Ok(envelope);
        };

        if let Some(data_key) = envelope.key.take() {
            let (sealed, nonce) = crypto::encrypt(master, &data_key)?;
            let mut wrapped = Vec::with_capacity(NONCE_SIZE + sealed.len());
            wrapped.extend_from_slice(&nonce);
            wrapped.extend_from_slice(&sealed);

            envelope.key = Some(wrapped);
            envelope.key_wrapped = true;
        }

        Ok(envelope)
    }

    /// Encrypt a record so that the envelope alone is enough to decrypt it.
    pub fn encrypt_portable<T: Serialize>(&self, record: &T) -> Result<EncryptionEnvelope> {
        let plaintext = serde_json::to_vec(record)?;
        let data_key = crypto::generate_key();
        let (ciphertext, nonce) = crypto::encrypt(&data_key, &plaintext)?;

        Ok(EncryptionEnvelope {
            ciphertext,
            iv: Some(nonce.to_vec()),
            key: Some(data_key.as_bytes().to_vec()),
            key_wrapped: false,
        })
    }

    pub fn decrypt<T: DeserializeOwned>(&self, envelope: &EncryptionEnvelope) -> Result<T> {
        let iv = envelope
            .iv
            .as_deref()
            .ok_or_else(|| {
                SecurityError::Decryption("initialization vector missing".to_string())
            })?;
        let key_bytes = envelope
            .key
            .as_deref()
            .ok_or_else(|| SecurityError::Decryption("key missing".to_string()))?;

        let data_key = if envelope.key_wrapped {
            self.unwrap_key(key_bytes)?
        } else {
            SecureKey::from_slice(key_bytes)
                .map_err(|e| SecurityError::Decryption(e.to_string()))?
        };

        let plaintext = crypto::decrypt(&data_key, &envelope.ciphertext, iv).inspect_err(|e| {
            tracing::debug!(key_wrapped = envelope.key_wrapped, error = %e, "Envelope failed to open");
        })?;
        serde_json::from_slice(&plaintext).map_err(|e| {
            SecurityError::Decryption(format!("decrypted payload is malformed: {e}"))
        })
    }

    fn unwrap_key(&self, wrapped: &[u8]) -> Result<SecureKey> {
        let master = self.master_key.as_ref().ok_or_else(|| {
            SecurityError::Decryption(
                "record key is wrapped but no master key is configured".to_string(),
            )
        })?;
        if wrapped.len() <= NONCE_SIZE {
            return Err(SecurityError::Decryption(
                "wrapped key is truncated".to_string(),
            ));
        }

        let (nonce, sealed) = wrapped.split_at(NONCE_SIZE);
        let raw = crypto::decrypt(master, sealed, nonce)?;
        SecureKey::from_slice(&raw).map_err(|e| SecurityError::Decryption(e.to_string()))
    }

    pub fn validate_session(&self, session: &Session) -> Result<()> {
        validation::validate_session(session)
    }

    pub fn sanitize_session(&self, session: Session) -> Session {
        sanitize::sanitize_session(session)
    }

    pub fn validate_share_token(&self, token: &str) -> Result<()> {
        token::validate_share_token(token)
    }

    pub fn validate_domain(&self, domain: &str) -> Result<()> {
        validation::validate_domain(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_key;
    use tabvault_model::Tab;

    fn sample() -> Session {
        Session::new(
            "Work",
            "work",
            vec![
                Tab::new("https://example.com", "Example"),
                Tab::new("https://docs.rs", "Docs"),
            ],
        )
    }

    #[test]
    fn test_round_trip_without_master_key() {
        let security = SecurityManager::new();
        let session = sample();

        let envelope = security.encrypt(&session).unwrap();
        assert!(!envelope.key_wrapped);
        assert!(envelope.is_complete());

        let restored: Session = security.decrypt(&envelope).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn test_round_trip_with_master_key() {
        let security = SecurityManager::with_master_key(generate_key());
        let session = sample();

        let envelope = security.encrypt(&session).unwrap();
        assert!(envelope.key_wrapped);

        let restored: Session = security.decrypt(&envelope).unwrap();
        assert_eq!(restored, session);

        // A different device cannot unwrap it
        let other = SecurityManager::with_master_key(generate_key());
        assert!(other.decrypt::<Session>(&envelope).is_err());
        assert!(SecurityManager::new().decrypt::<Session>(&envelope).is_err());
    }

    #[test]
    fn test_portable_envelope_ignores_master_key() {
        let owner = SecurityManager::with_master_key(generate_key());
        let envelope = owner.encrypt_portable(&sample()).unwrap();
        assert!(!envelope.key_wrapped);

        let restored: Session = SecurityManager::new().decrypt(&envelope).unwrap();
        assert_eq!(restored.name, "Work");
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let security = SecurityManager::new();
        let mut envelope = security.encrypt(&sample()).unwrap();
        envelope.ciphertext[0] ^= 0xff;

        let err = security.decrypt::<Session>(&envelope).unwrap_err();
        assert!(matches!(err, SecurityError::Decryption(_)));
    }

    #[test]
    fn test_missing_iv_fails() {
        let security = SecurityManager::new();
        let mut envelope = security.encrypt(&sample()).unwrap();
        envelope.iv = None;
        assert!(security.decrypt::<Session>(&envelope).is_err());
    }

    #[test]
    fn test_master_key_from_base64() {
        let encoded = STANDARD.encode([7u8; 32]);
        assert!(SecurityManager::from_base64_master_key(&encoded)
            .unwrap()
            .has_master_key());
        assert!(SecurityManager::from_base64_master_key("c2hvcnQ=").is_err());
    }
}
