//! Periodic maintenance
//!
//! Reads run unlocked; the resulting mutations run under the session lock.

use serde_json::Value;

use tabvault_storage::keys;

use crate::record::{QuarantineEntry, SessionRecord};
use crate::report::MaintenanceReport;
use crate::store::SessionStore;
use crate::Result;

impl SessionStore {
    /// Expire old sessions, quarantine damaged records and prune old backups.
    pub async fn maintenance(&self) -> Result<MaintenanceReport> {
        let now = self.now();
        let cutoff_millis = (now - self.options.backup_retention).timestamp_millis();
        let entries = self.store.get_all().await?;

        let mut expired = Vec::new();
        let mut damaged: Vec<(String, Value, String)> = Vec::new();
        let mut stale_backups = Vec::new();

        for (key, value) in entries {
            if keys::is_session_key(&key) {
                match serde_json::from_value::<SessionRecord>(value.clone()) {
                    Ok(record) if record.is_expired(now) => expired.push(key),
                    Ok(record) => {
                        if let Err(reason) = self.check_integrity(&record) {
                            damaged.push((key, value, reason));
                        }
                    }
                    Err(e) => damaged.push((key, value, format!("unparsable record: {e}"))),
                }
            } else if key.starts_with(keys::BACKUP_PREFIX) {
                if backup_millis(&key).is_some_and(|millis| millis < cutoff_millis) {
                    stale_backups.push(key);
                }
            }
        }

        let _guard = self.acquire().await?;

        for id in &expired {
            self.remove_cascade(id).await?;
            tracing::info!(session_id = %id, "Removed expired session");
        }

        for (id, record, reason) in &damaged {
            let entry = QuarantineEntry {
                record: record.clone(),
                reason: reason.clone(),
                quarantined_at: now,
            };
            self.store
                .set_one(&keys::quarantine(id), serde_json::to_value(&entry)?)
                .await?;
            self.store.remove_one(id).await?;
            self.cache.write().remove(id);
            tracing::warn!(session_id = %id, reason = %reason, "Quarantined session record");
        }

        stale_backups.retain(|key| {
            !expired
                .iter()
                .any(|id| key.starts_with(&keys::backup_prefix(id)))
        });
        self.store.remove(&stale_backups).await?;

        let report = MaintenanceReport {
            expired: expired.len(),
            quarantined: damaged.len(),
            backups_pruned: stale_backups.len(),
        };
        tracing::info!(
            expired = report.expired,
            quarantined = report.quarantined,
            backups_pruned = report.backups_pruned,
            "Maintenance complete"
        );
        Ok(report)
    }

    /// Write a fresh backup of every live record. Returns how many were written.
    pub async fn backup_all(&self) -> Result<usize> {
        let entries = self.store.get_all().await?;
        let mut written = 0;

        for (key, value) in entries {
            if !keys::is_session_key(&key) {
                continue;
            }
            match serde_json::from_value::<SessionRecord>(value) {
                Ok(record) => {
                    self.write_backup(&record).await?;
                    written += 1;
                }
                Err(e) => {
                    tracing::debug!(session_id = %key, error = %e, "Skipping unparsable record")
                }
            }
        }

        tracing::info!(count = written, "Backed up sessions");
        Ok(written)
    }

    fn check_integrity(&self, record: &SessionRecord) -> std::result::Result<(), String> {
        if record.encrypted {
            return match &record.envelope {
                Some(envelope) if envelope.is_complete() => Ok(()),
                Some(_) => Err("encrypted record is missing its key or IV".to_string()),
                None => Err("encrypted record has no envelope".to_string()),
            };
        }

        let session = record
            .session
            .as_ref()
            .ok_or_else(|| "record has no session data".to_string())?;
        self.security
            .validate_session(session)
            .map_err(|e| e.to_string())
    }
}

/// Timestamp suffix of a `backup_<id>_<millis>` key
fn backup_millis(key: &str) -> Option<i64> {
    key.rsplit('_').next()?.parse().ok()
}
