//! AES-256-GCM primitives

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SecurityError;
use crate::Result;

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// A key that is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureKey([u8; KEY_SIZE]);

impl SecureKey {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self(key)
    }

    /// Build a key from a slice, rejecting anything that is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            SecurityError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecureKey(..)")
    }
}

/// Generates a new random AES-256 key.
pub fn generate_key() -> SecureKey {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    SecureKey::new(key)
}

/// Generates a new random AES-GCM nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts `plaintext` under `key` with a fresh nonce.
///
/// Returns the ciphertext (with tag) and the nonce used.
pub fn encrypt(key: &SecureKey, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_SIZE])> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| SecurityError::Encryption(e.to_string()))?;

    Ok((ciphertext, nonce_bytes))
}

pub fn decrypt(key: &SecureKey, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
    let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|_| {
        SecurityError::Decryption(format!(
            "initialization vector must be {} bytes, got {}",
            NONCE_SIZE,
            nonce.len()
        ))
    })?;
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(&Nonce::from(nonce), ciphertext)
        .map_err(|_| {
            SecurityError::Decryption(
                "ciphertext was tampered with or the key does not match".to_string(),
            )
        })
}
