//! Stored forms of a session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use tabvault_model::Session;
use tabvault_security::EncryptionEnvelope;

use crate::Result;

/// What lives under a `session_<uuid>` key.
///
/// Encrypted records keep only their timestamps in the clear so maintenance
/// can expire them without decrypting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EncryptionEnvelope>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "first_version")]
    pub version: u64,
}

fn first_version() -> u64 {
    1
}

impl SessionRecord {
    pub fn plain(session: Session) -> Self {
        Self {
            id: session.id.clone(),
            encrypted: false,
            created_at: session.created_at,
            expires_at: session.expires_at,
            version: session.version,
            session: Some(session),
            envelope: None,
        }
    }

    pub fn sealed(session: &Session, envelope: EncryptionEnvelope) -> Self {
        Self {
            id: session.id.clone(),
            encrypted: true,
            session: None,
            envelope: Some(envelope),
            created_at: session.created_at,
            expires_at: session.expires_at,
            version: session.version,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .or_else(|| self.session.as_ref().and_then(|s| s.expires_at))
            .is_some_and(|expires| expires < now)
    }
}

/// Left behind by a delete so sync can propagate it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub id: String,
    pub deleted_at: DateTime<Utc>,
    pub version: u64,
}

/// Point-in-time copy of a session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub original_id: String,
    pub backup_time: DateTime<Utc>,
    /// Hex SHA-256 of the serialized record
    pub checksum: String,
    pub record: SessionRecord,
}

impl Backup {
    pub fn new(record: SessionRecord, backup_time: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            original_id: record.id.clone(),
            backup_time,
            checksum: checksum(&record)?,
            record,
        })
    }

    pub fn verify(&self) -> bool {
        checksum(&self.record).is_ok_and(|sum| sum == self.checksum)
    }
}

fn checksum(record: &SessionRecord) -> Result<String> {
    let digest = Sha256::digest(serde_json::to_vec(record)?);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

/// A record pulled out of the live set by the integrity sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineEntry {
    /// The record exactly as it was found
    pub record: Value,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabvault_model::Tab;

    #[test]
    fn test_backup_checksum_detects_tampering() {
        let mut session = Session::new("Work", "work", vec![Tab::new("https://a.com", "A")]);
        session.id = "session_1".to_string();

        let mut backup = Backup::new(SessionRecord::plain(session), Utc::now()).unwrap();
        assert!(backup.verify());
        assert_eq!(backup.original_id, "session_1");

        if let Some(session) = backup.record.session.as_mut() {
            session.name = "Changed".to_string();
        }
        assert!(!backup.verify());
    }

    #[test]
    fn test_expiry_falls_back_to_session() {
        let session = Session::new("Work", "work", vec![]);
        let mut record = SessionRecord::plain(session);
        record.expires_at = None;

        let later = Utc::now() + chrono::Duration::days(31);
        assert!(record.is_expired(later));
        assert!(!record.is_expired(Utc::now()));
    }
}
