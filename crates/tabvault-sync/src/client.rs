//! Sync client
//!
//! Pull, merge, apply locally, push. Each network step retries transient
//! failures; an `Unauthorized` answer triggers one credential refresh.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use tabvault_session::{SessionRecord, Tombstone};
use tabvault_storage::{keys, KeyValueStore};

use crate::error::SyncError;
use crate::resolver::{merge, SyncEntry, SyncSet};
use crate::retry::RetryPolicy;
use crate::transport::SyncTransport;
use crate::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub pulled: usize,
    pub pushed: usize,
    /// Records written or replaced locally
    pub updated: usize,
    /// Records deleted locally because the remote side deleted them
    pub removed: usize,
}

pub struct SyncClient {
    transport: Arc<dyn SyncTransport>,
    store: Arc<dyn KeyValueStore>,
    policy: RetryPolicy,
}

impl SyncClient {
    pub fn new(transport: Arc<dyn SyncTransport>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            transport,
            store,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn sync(&self) -> Result<SyncReport> {
        let local = self.local_set().await?;
        let remote = self.with_retry("pull", || self.transport.pull()).await?;
        let pulled = remote.len();
        let remote = admissible(remote);

        let merged = merge(&local, &remote);
        let (updated, removed) = self.apply(&local, &merged).await?;
        self.with_retry("push", || self.transport.push(&merged))
            .await?;

        let report = SyncReport {
            pulled,
            pushed: merged.len(),
            updated,
            removed,
        };
        tracing::info!(
            pulled = report.pulled,
            pushed = report.pushed,
            updated = report.updated,
            removed = report.removed,
            "Sync complete"
        );
        Ok(report)
    }

    /// Live session records and tombstones, keyed by session id
    pub async fn local_set(&self) -> Result<SyncSet> {
        let mut set = SyncSet::new();

        for (key, value) in self.store.get_all().await? {
            if keys::is_session_key(&key) {
                let version = serde_json::from_value::<SessionRecord>(value.clone())
                    .map_or(1, |record| record.version);
                set.insert(key, SyncEntry::live(version, value));
            } else if let Some(id) = key.strip_prefix(keys::TOMBSTONE_PREFIX) {
                if let Ok(tombstone) = serde_json::from_value::<Tombstone>(value) {
                    set.insert(id.to_string(), SyncEntry::tombstone(tombstone.version));
                }
            }
        }

        Ok(set)
    }

    /// Write every merged entry that differs from what is stored locally
    async fn apply(&self, local: &SyncSet, merged: &SyncSet) -> Result<(usize, usize)> {
        let mut writes: Vec<(String, Value)> = Vec::new();
        let mut removals = Vec::new();

        for (id, entry) in merged {
            if local.get(id) == Some(entry) {
                continue;
            }

            if entry.deleted {
                let tombstone = Tombstone {
                    id: id.clone(),
                    deleted_at: chrono::Utc::now(),
                    version: entry.version,
                };
                writes.push((keys::tombstone(id), serde_json::to_value(&tombstone)?));
                if local.get(id).is_some_and(|e| !e.deleted) {
                    removals.push(id.clone());
                }
            } else if let Some(data) = &entry.data {
                writes.push((id.clone(), data.clone()));
            }
        }

        let updated = writes.len() - removals.len();
        let removed = removals.len();
        if !writes.is_empty() {
            self.store.set(writes).await?;
        }
        if !removals.is_empty() {
            self.store.remove(&removals).await?;
        }
        Ok((updated, removed))
    }

    async fn with_retry<T, F, Fut>(&self, step: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut refreshed = false;
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(SyncError::Unauthorized) if !refreshed => {
                    tracing::info!(step = step, "Sync credentials rejected, refreshing");
                    self.transport.refresh_credentials().await?;
                    refreshed = true;
                    last_error = SyncError::Unauthorized.to_string();
                }
                Err(e) if e.is_transient() => {
                    last_error = e.to_string();
                    if attempt < self.policy.max_attempts {
                        let delay = e.retry_after().unwrap_or(self.policy.delay);
                        tracing::warn!(
                            step = step,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Sync step failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(SyncError::RetryExhausted {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }
}

/// Remote entries allowed into the live session namespace: session keys
/// holding a tombstone or a record stored under its own id.
fn admissible(remote: SyncSet) -> SyncSet {
    remote
        .into_iter()
        .filter(|(key, entry)| {
            let accepted = keys::is_session_key(key)
                && (entry.deleted
                    || entry
                        .data
                        .as_ref()
                        .and_then(|data| serde_json::from_value::<SessionRecord>(data.clone()).ok())
                        .is_some_and(|record| record.id == *key));
            if !accepted {
                tracing::warn!(key = %key, "Ignoring remote entry outside the session namespace");
            }
            accepted
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};
    use tabvault_storage::Database;

    /// Transport that answers pulls from a script and records pushes
    #[derive(Default)]
    struct ScriptedTransport {
        pulls: Mutex<VecDeque<Result<SyncSet>>>,
        pushed: Mutex<Vec<SyncSet>>,
        pull_calls: Mutex<u32>,
        refreshes: Mutex<u32>,
    }

    impl ScriptedTransport {
        fn with_pulls(pulls: Vec<Result<SyncSet>>) -> Self {
            Self {
                pulls: Mutex::new(pulls.into()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl SyncTransport for ScriptedTransport {
        async fn pull(&self) -> Result<SyncSet> {
            *self.pull_calls.lock() += 1;
            self.pulls
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(SyncSet::new()))
        }

        async fn push(&self, records: &SyncSet) -> Result<()> {
            self.pushed.lock().push(records.clone());
            Ok(())
        }

        async fn refresh_credentials(&self) -> Result<()> {
            *self.refreshes.lock() += 1;
            Ok(())
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    fn unavailable(retry_after: Option<Duration>) -> SyncError {
        SyncError::Status {
            status: 503,
            message: "Service Unavailable".to_string(),
            retry_after,
        }
    }

    fn record(id: &str, version: u64) -> Value {
        json!({
            "id": id,
            "session": { "id": id, "name": id, "version": version },
            "version": version,
        })
    }

    fn client_for(transport: Arc<ScriptedTransport>) -> (SyncClient, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let client = SyncClient::new(transport, db.clone()).with_policy(fast());
        (client, db)
    }

    #[tokio::test]
    async fn test_sync_merges_and_applies() {
        let remote: SyncSet = [
            ("session_b".to_string(), SyncEntry::live(1, record("session_b", 1))),
            ("session_c".to_string(), SyncEntry::tombstone(4)),
            ("session_a".to_string(), SyncEntry::live(5, record("session_a", 5))),
        ]
        .into_iter()
        .collect();
        let transport = Arc::new(ScriptedTransport::with_pulls(vec![Ok(remote)]));
        let (client, db) = client_for(transport.clone());

        db.set(vec![
            ("session_a".to_string(), record("session_a", 2)),
            ("session_c".to_string(), record("session_c", 3)),
        ])
        .await
        .unwrap();

        let report = client.sync().await.unwrap();
        assert_eq!(report.pulled, 3);
        assert_eq!(report.removed, 1);
        assert_eq!(report.updated, 2);

        let a = db.get("session_a").await.unwrap().unwrap();
        assert_eq!(a["version"], 5);
        assert!(db.get("session_b").await.unwrap().is_some());
        assert!(db.get("session_c").await.unwrap().is_none());
        assert!(db.get(&keys::tombstone("session_c")).await.unwrap().is_some());

        let pushed = transport.pushed.lock();
        assert_eq!(pushed.len(), 1);
        assert!(pushed[0]["session_c"].deleted);

        // A second round with the same remote state changes nothing
        drop(pushed);
        let again = client.sync().await.unwrap();
        assert_eq!(again.updated + again.removed, 0);
    }

    #[tokio::test]
    async fn test_remote_cannot_write_outside_sessions() {
        let remote: SyncSet = [
            ("categories".to_string(), SyncEntry::live(9, json!(["pwned"]))),
            (
                "quarantine_session_q".to_string(),
                SyncEntry::live(1, record("session_q", 1)),
            ),
            ("session_x".to_string(), SyncEntry::live(3, record("session_y", 3))),
            ("session_z".to_string(), SyncEntry::live(1, json!("not a record"))),
            ("session_ok".to_string(), SyncEntry::live(1, record("session_ok", 1))),
        ]
        .into_iter()
        .collect();
        let transport = Arc::new(ScriptedTransport::with_pulls(vec![Ok(remote)]));
        let (client, db) = client_for(transport.clone());
        db.set_one(keys::CATEGORIES, json!(["work"])).await.unwrap();

        let report = client.sync().await.unwrap();
        assert_eq!(report.pulled, 5);
        assert_eq!(report.updated, 1);

        assert_eq!(db.get(keys::CATEGORIES).await.unwrap().unwrap(), json!(["work"]));
        assert!(db.get("quarantine_session_q").await.unwrap().is_none());
        assert!(db.get("session_x").await.unwrap().is_none());
        assert!(db.get("session_z").await.unwrap().is_none());
        assert!(db.get("session_ok").await.unwrap().is_some());

        let pushed = transport.pushed.lock();
        assert_eq!(pushed[0].keys().collect::<Vec<_>>(), vec!["session_ok"]);
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let transport = Arc::new(ScriptedTransport::with_pulls(vec![
            Err(unavailable(None)),
            Err(unavailable(None)),
            Ok(SyncSet::new()),
        ]));
        let (client, _db) = client_for(transport.clone());

        client.sync().await.unwrap();
        assert_eq!(*transport.pull_calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_attempts() {
        let transport = Arc::new(ScriptedTransport::with_pulls(vec![
            Err(unavailable(None)),
            Err(unavailable(None)),
            Err(unavailable(None)),
            Ok(SyncSet::new()),
        ]));
        let (client, _db) = client_for(transport.clone());

        let err = client.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(*transport.pull_calls.lock(), 3);
        assert!(transport.pushed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_honours_retry_after() {
        let transport = Arc::new(ScriptedTransport::with_pulls(vec![
            Err(SyncError::Status {
                status: 429,
                message: "Too Many Requests".to_string(),
                retry_after: Some(Duration::from_millis(50)),
            }),
            Ok(SyncSet::new()),
        ]));
        let (client, _db) = client_for(transport);

        let started = Instant::now();
        client.sync().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once() {
        let transport = Arc::new(ScriptedTransport::with_pulls(vec![
            Err(SyncError::Unauthorized),
            Ok(SyncSet::new()),
        ]));
        let (client, _db) = client_for(transport.clone());

        client.sync().await.unwrap();
        assert_eq!(*transport.refreshes.lock(), 1);

        let transport = Arc::new(ScriptedTransport::with_pulls(vec![
            Err(SyncError::Unauthorized),
            Err(SyncError::Unauthorized),
        ]));
        let (client, _db) = client_for(transport.clone());
        assert!(matches!(
            client.sync().await,
            Err(SyncError::Unauthorized)
        ));
        assert_eq!(*transport.refreshes.lock(), 1);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let transport = Arc::new(ScriptedTransport::with_pulls(vec![Err(SyncError::Status {
            status: 400,
            message: "bad request".to_string(),
            retry_after: None,
        })]));
        let (client, _db) = client_for(transport.clone());

        assert!(client.sync().await.is_err());
        assert_eq!(*transport.pull_calls.lock(), 1);
    }
}
