//! Session Store
//!
//! Locked CRUD over session records. Every save lands under a fresh id and
//! leaves a backup behind; loads fall back to the newest intact backup when
//! the live record cannot be opened.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use tabvault_cookies::CookieTransport;
use tabvault_model::{HostContext, Notification, NotificationPriority, Session};
use tabvault_security::SecurityManager;
use tabvault_storage::{keys, KeyValueStore};

use crate::error::SessionError;
use crate::record::{Backup, SessionRecord, Tombstone};
use crate::report::{ImportOutcome, LoadedSession};
use crate::Result;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Seal records at rest
    pub encrypt: bool,
    pub lock_timeout: std::time::Duration,
    pub backup_retention: Duration,
    /// Loads within this window of `expires_at` carry a warning
    pub expiry_warning: Duration,
    /// Passed to the cookie transport used for restores
    pub secure_context: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            encrypt: false,
            lock_timeout: std::time::Duration::from_secs(5),
            backup_retention: Duration::days(7),
            expiry_warning: Duration::days(7),
            secure_context: true,
        }
    }
}

pub struct SessionStore {
    /// Decrypted sessions by id
    pub(crate) cache: Arc<RwLock<HashMap<String, Session>>>,
    /// Serializes every mutation of the live set
    lock: Arc<Mutex<()>>,
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) security: SecurityManager,
    pub(crate) host: HostContext,
    pub(crate) cookies: CookieTransport,
    pub(crate) options: StoreOptions,
}

impl SessionStore {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        security: SecurityManager,
        host: HostContext,
        options: StoreOptions,
    ) -> Self {
        let cookies =
            CookieTransport::new(Arc::clone(&store), host.clone(), options.secure_context);

        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            lock: Arc::new(Mutex::new(())),
            store,
            security,
            host,
            cookies,
            options,
        }
    }

    /// Warm the cache from storage and seed the category list.
    /// Returns the number of readable sessions.
    pub async fn initialize(&self) -> Result<usize> {
        let sessions = self.read_all().await?;
        let count = sessions.len();

        {
            let mut cache = self.cache.write();
            cache.clear();
            for session in sessions {
                cache.insert(session.id.clone(), session);
            }
        }

        self.list_categories().await?;

        tracing::info!(sessions = count, "Initialized session store");
        Ok(count)
    }

    pub(crate) async fn acquire(&self) -> Result<MutexGuard<'_, ()>> {
        tokio::time::timeout(self.options.lock_timeout, self.lock.lock())
            .await
            .map_err(|_| {
                tracing::warn!(
                    timeout_ms = self.options.lock_timeout.as_millis() as u64,
                    "Session lock acquisition timed out"
                );
                SessionError::LockTimeout
            })
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.host.clock.now()
    }

    /// Sanitize, validate and persist `session` under a fresh id.
    pub async fn save(&self, session: Session) -> Result<Session> {
        let mut session = self.security.sanitize_session(session);
        self.security.validate_session(&session)?;

        let _guard = self.acquire().await?;

        session.id = Session::generate_id();
        session.encrypted = self.options.encrypt;
        let record = self.seal(&session)?;

        self.store
            .set_one(&session.id, serde_json::to_value(&record)?)
            .await?;
        self.cache
            .write()
            .insert(session.id.clone(), session.clone());
        self.write_backup(&record).await?;

        tracing::info!(
            session_id = %session.id,
            session_name = %session.name,
            tab_count = session.tab_count(),
            encrypted = session.encrypted,
            "Saved session"
        );

        Ok(session)
    }

    pub async fn load(&self, id: &str) -> Result<LoadedSession> {
        let value = self.live_record(id).await?;

        let (session, recovered_from_backup) = match self.open_value(id, value) {
            Ok(session) => (session, false),
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Session unreadable, trying backups");
                match self.recover_from_backup(id).await? {
                    Some(session) => (session, true),
                    None => return Err(SessionError::Unrecoverable),
                }
            }
        };

        self.security.validate_session(&session)?;
        let expiry_warning = self.expiry_warning(&session).await;

        self.cache
            .write()
            .insert(session.id.clone(), session.clone());

        Ok(LoadedSession {
            session,
            recovered_from_backup,
            expiry_warning,
        })
    }

    /// Remove a session together with its backups and cookie package.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.acquire().await?;

        let value = self.live_record(id).await?;
        self.remove_cascade(id).await?;

        let version = serde_json::from_value::<SessionRecord>(value).map_or(1, |r| r.version);
        let tombstone = Tombstone {
            id: id.to_string(),
            deleted_at: self.now(),
            version: version + 1,
        };
        self.store
            .set_one(&keys::tombstone(id), serde_json::to_value(&tombstone)?)
            .await?;

        tracing::info!(session_id = %id, "Deleted session");
        Ok(())
    }

    pub async fn toggle_favorite(&self, id: &str) -> Result<Session> {
        self.update(id, |session| session.favorite = !session.favorite)
            .await
    }

    pub async fn update_category(&self, id: &str, category: &str) -> Result<Session> {
        let category = category.to_string();
        self.update(id, move |session| session.category = category)
            .await
    }

    /// Sessions in the cache, newest first
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.cache.read().values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    pub fn by_category(&self, category: &str) -> Vec<Session> {
        self.list()
            .into_iter()
            .filter(|s| s.category.eq_ignore_ascii_case(category))
            .collect()
    }

    /// Case-insensitive search over names, categories, tab titles and urls.
    /// An empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<Session> {
        let needle = query.trim().to_lowercase();
        self.list()
            .into_iter()
            .filter(|s| needle.is_empty() || s.matches(&needle))
            .collect()
    }

    /// Every readable session in storage. Unreadable records are skipped.
    pub async fn export_all(&self) -> Result<Vec<Session>> {
        let mut sessions = self.read_all().await?;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        tracing::info!(count = sessions.len(), "Exported sessions");
        Ok(sessions)
    }

    /// Save each record as a new session. Never stops at the first failure.
    pub async fn import_all(&self, records: Vec<Value>) -> Vec<ImportOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());

        for (index, value) in records.into_iter().enumerate() {
            let saved = match serde_json::from_value::<Session>(value) {
                Ok(session) => self.save(session).await,
                Err(e) => Err(e.into()),
            };

            outcomes.push(match saved {
                Ok(session) => ImportOutcome {
                    index,
                    success: true,
                    id: Some(session.id),
                    error: None,
                },
                Err(e) => {
                    tracing::debug!(index = index, error = %e, "Skipped imported session");
                    ImportOutcome {
                        index,
                        success: false,
                        id: None,
                        error: Some(e.to_string()),
                    }
                }
            });
        }

        let imported = outcomes.iter().filter(|o| o.success).count();
        tracing::info!(
            imported = imported,
            total = outcomes.len(),
            "Imported sessions"
        );
        outcomes
    }

    /// Raw live record. Keys outside the session namespace are never sessions.
    async fn live_record(&self, id: &str) -> Result<Value> {
        if !keys::is_session_key(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    async fn update<F>(&self, id: &str, mutate: F) -> Result<Session>
    where
        F: FnOnce(&mut Session) + Send,
    {
        let _guard = self.acquire().await?;

        let value = self.live_record(id).await?;
        let mut session = self.open_value(id, value)?;

        mutate(&mut session);
        let mut session = self.security.sanitize_session(session);
        self.security.validate_session(&session)?;
        session.version += 1;

        let record = self.seal(&session)?;
        self.store.set_one(id, serde_json::to_value(&record)?).await?;
        self.cache
            .write()
            .insert(session.id.clone(), session.clone());

        tracing::info!(session_id = %id, version = session.version, "Updated session");
        Ok(session)
    }

    pub(crate) fn seal(&self, session: &Session) -> Result<SessionRecord> {
        if session.encrypted {
            let envelope = self.security.encrypt(session)?;
            Ok(SessionRecord::sealed(session, envelope))
        } else {
            Ok(SessionRecord::plain(session.clone()))
        }
    }

    pub(crate) fn open(&self, record: &SessionRecord) -> Result<Session> {
        let corrupt = |reason: &str| SessionError::Corrupt {
            id: record.id.clone(),
            reason: reason.to_string(),
        };

        let mut session: Session = if record.encrypted {
            let envelope = record
                .envelope
                .as_ref()
                .ok_or_else(|| corrupt("encrypted record has no envelope"))?;
            self.security.decrypt(envelope)?
        } else {
            record
                .session
                .clone()
                .ok_or_else(|| corrupt("record has no session data"))?
        };

        session.id = record.id.clone();
        Ok(session)
    }

    fn open_value(&self, id: &str, value: Value) -> Result<Session> {
        let record: SessionRecord =
            serde_json::from_value(value).map_err(|e| SessionError::Corrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        self.open(&record)
    }

    pub(crate) async fn write_backup(&self, record: &SessionRecord) -> Result<()> {
        let now = self.now();
        let backup = Backup::new(record.clone(), now)?;
        self.store
            .set_one(
                &keys::backup(&record.id, now.timestamp_millis()),
                serde_json::to_value(&backup)?,
            )
            .await?;
        Ok(())
    }

    /// Newest backup of `id` that verifies and opens
    async fn recover_from_backup(&self, id: &str) -> Result<Option<Session>> {
        let prefix = keys::backup_prefix(id);
        let mut backups: Vec<Backup> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(_, value)| serde_json::from_value::<Backup>(value).ok())
            .filter(|backup| backup.original_id == id)
            .collect();
        backups.sort_by(|a, b| b.backup_time.cmp(&a.backup_time));

        for backup in backups {
            if !backup.verify() {
                tracing::warn!(session_id = %id, backup_time = %backup.backup_time, "Backup checksum mismatch");
                continue;
            }
            match self.open(&backup.record) {
                Ok(session) => {
                    tracing::warn!(
                        session_id = %id,
                        backup_time = %backup.backup_time,
                        "Recovered session from backup"
                    );
                    return Ok(Some(session));
                }
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "Backup unreadable");
                }
            }
        }

        Ok(None)
    }

    async fn expiry_warning(&self, session: &Session) -> Option<String> {
        let expires = session.expires_at?;
        if expires - self.now() > self.options.expiry_warning {
            return None;
        }

        let message = if expires <= self.now() {
            format!("Session \"{}\" has expired", session.name)
        } else {
            format!(
                "Session \"{}\" expires on {}",
                session.name,
                expires.format("%Y-%m-%d %H:%M UTC")
            )
        };

        let notification = Notification::new(
            "Session expiring soon",
            message.clone(),
            NotificationPriority::High,
        );
        if let Err(e) = self
            .host
            .notifier
            .show(&format!("expiry_{}", session.id), &notification)
            .await
        {
            tracing::warn!(session_id = %session.id, error = %e, "Failed to show expiry notice");
        }

        Some(message)
    }

    /// Caller holds the lock
    pub(crate) async fn remove_cascade(&self, id: &str) -> Result<()> {
        let prefix = keys::backup_prefix(id);
        let mut doomed: Vec<String> = self
            .store
            .get_all()
            .await?
            .into_keys()
            .filter(|key| key.starts_with(&prefix))
            .collect();
        doomed.push(id.to_string());
        doomed.push(keys::cookie_package(id));

        self.store.remove(&doomed).await?;
        self.cache.write().remove(id);
        Ok(())
    }

    /// Every live record that opens
    async fn read_all(&self) -> Result<Vec<Session>> {
        let entries = self.store.get_all().await?;
        let mut sessions = Vec::new();

        for (key, value) in entries {
            if !keys::is_session_key(&key) {
                continue;
            }
            match self.open_value(&key, value) {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!(session_id = %key, error = %e, "Skipping unreadable session"),
            }
        }

        Ok(sessions)
    }
}

impl Clone for SessionStore {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            lock: Arc::clone(&self.lock),
            store: Arc::clone(&self.store),
            security: self.security.clone(),
            host: self.host.clone(),
            cookies: self.cookies.clone(),
            options: self.options.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use tabvault_model::host::MemoryHost;
    use tabvault_model::Tab;
    use tabvault_storage::Database;

    pub(crate) fn store_with(options: StoreOptions) -> (SessionStore, MemoryHost, Arc<Database>) {
        let host = MemoryHost::new();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = SessionStore::new(
            db.clone(),
            SecurityManager::new(),
            host.context(),
            options,
        );
        (store, host, db)
    }

    pub(crate) fn sample(name: &str) -> Session {
        Session::new(
            name,
            "work",
            vec![
                Tab::new("https://example.com/", "Example"),
                Tab::new("https://docs.rs/", "Docs"),
            ],
        )
    }

    fn encrypted() -> StoreOptions {
        StoreOptions {
            encrypt: true,
            ..StoreOptions::default()
        }
    }

    async fn backup_keys(db: &Database, id: &str) -> Vec<String> {
        let prefix = keys::backup_prefix(id);
        db.get_all()
            .await
            .unwrap()
            .into_keys()
            .filter(|k| k.starts_with(&prefix))
            .collect()
    }

    #[tokio::test]
    async fn test_save_assigns_fresh_id_and_backs_up() {
        let (store, _host, db) = store_with(StoreOptions::default());

        let mut session = sample("Work");
        session.id = "session_caller_chosen".to_string();
        let saved = store.save(session).await.unwrap();

        assert!(saved.id.starts_with("session_"));
        assert_ne!(saved.id, "session_caller_chosen");
        assert_eq!(backup_keys(&db, &saved.id).await.len(), 1);
        assert_eq!(store.list().len(), 1);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_session() {
        let (store, _host, _db) = store_with(StoreOptions::default());

        let err = store.save(Session::new("", "", vec![])).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("name"));
        assert!(message.contains("tabs"));
        assert!(message.contains("category"));
        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn test_encrypted_round_trip() {
        let (store, _host, db) = store_with(encrypted());

        let saved = store.save(sample("Secret")).await.unwrap();
        let raw = db.get(&saved.id).await.unwrap().unwrap();
        assert!(raw.get("session").is_none());
        assert!(!raw.to_string().contains("Secret"));

        let loaded = store.load(&saved.id).await.unwrap();
        assert_eq!(loaded.session.name, "Secret");
        assert_eq!(loaded.session.tab_count(), 2);
        assert!(loaded.session.encrypted);
        assert!(!loaded.recovered_from_backup);
    }

    #[tokio::test]
    async fn test_concurrent_saves_produce_distinct_records() {
        let (store, _host, _db) = store_with(encrypted());

        let (a, b) = tokio::join!(store.save(sample("A")), store.save(sample("B")));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.id, b.id);

        let loaded_a = store.load(&a.id).await.unwrap().session;
        let loaded_b = store.load(&b.id).await.unwrap().session;
        assert_eq!(loaded_a.name, "A");
        assert_eq!(loaded_b.name, "B");
        assert_eq!(loaded_a.tabs, sample("A").tabs);
    }

    #[tokio::test]
    async fn test_lock_timeout() {
        let (store, _host, _db) = store_with(StoreOptions {
            lock_timeout: std::time::Duration::from_millis(20),
            ..StoreOptions::default()
        });

        let guard = store.acquire().await.unwrap();
        let err = store.save(sample("Blocked")).await.unwrap_err();
        assert!(matches!(err, SessionError::LockTimeout));

        drop(guard);
        store.save(sample("Unblocked")).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_recovers_from_backup() {
        let (store, _host, db) = store_with(encrypted());
        let saved = store.save(sample("Fragile")).await.unwrap();

        let mut record: SessionRecord =
            serde_json::from_value(db.get(&saved.id).await.unwrap().unwrap()).unwrap();
        if let Some(envelope) = record.envelope.as_mut() {
            envelope.ciphertext[0] ^= 0xff;
        }
        db.set_one(&saved.id, serde_json::to_value(&record).unwrap())
            .await
            .unwrap();

        let loaded = store.load(&saved.id).await.unwrap();
        assert!(loaded.recovered_from_backup);
        assert_eq!(loaded.session.name, "Fragile");
    }

    #[tokio::test]
    async fn test_load_without_backup_fails() {
        let (store, _host, db) = store_with(encrypted());
        let saved = store.save(sample("Fragile")).await.unwrap();

        db.remove(&backup_keys(&db, &saved.id).await).await.unwrap();
        db.set_one(&saved.id, json!({ "id": &saved.id, "encrypted": true }))
            .await
            .unwrap();

        let err = store.load(&saved.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to decrypt session and no backup found");
    }

    #[tokio::test]
    async fn test_load_missing_session() {
        let (store, _host, _db) = store_with(StoreOptions::default());
        assert!(matches!(
            store.load("session_nope").await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_keys_are_not_sessions() {
        let (store, _host, db) = store_with(StoreOptions::default());
        store.add_category("travel").await.unwrap();
        let share_key = "share_1700000000000_abc";
        db.set_one(share_key, json!({ "token": share_key }))
            .await
            .unwrap();

        for id in [keys::CATEGORIES, share_key] {
            assert!(matches!(store.delete(id).await, Err(SessionError::NotFound(_))));
            assert!(matches!(store.load(id).await, Err(SessionError::NotFound(_))));
            assert!(matches!(
                store.toggle_favorite(id).await,
                Err(SessionError::NotFound(_))
            ));
            assert!(db.get(&keys::tombstone(id)).await.unwrap().is_none());
        }

        assert!(db.get(share_key).await.unwrap().is_some());
        assert!(store
            .list_categories()
            .await
            .unwrap()
            .contains(&"travel".to_string()));
    }

    #[tokio::test]
    async fn test_near_expiry_warning_notifies() {
        let (store, host, _db) = store_with(StoreOptions::default());

        let mut session = sample("Soon");
        session.expires_at = session.created_at.map(|c| c + Duration::days(3));
        let saved = store.save(session).await.unwrap();

        let loaded = store.load(&saved.id).await.unwrap();
        assert!(loaded.expiry_warning.is_some());

        let shown = host.notifier.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].0, format!("expiry_{}", saved.id));

        let fresh = store.save(sample("Later")).await.unwrap();
        assert!(store.load(&fresh.id).await.unwrap().expiry_warning.is_none());
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (store, _host, db) = store_with(StoreOptions::default());
        let saved = store.save(sample("Doomed")).await.unwrap();
        db.set_one(&keys::cookie_package(&saved.id), json!({}))
            .await
            .unwrap();

        store.delete(&saved.id).await.unwrap();

        assert!(db.get(&saved.id).await.unwrap().is_none());
        assert!(db.get(&keys::cookie_package(&saved.id)).await.unwrap().is_none());
        assert!(backup_keys(&db, &saved.id).await.is_empty());
        assert!(store.list().is_empty());

        let tombstone: Tombstone =
            serde_json::from_value(db.get(&keys::tombstone(&saved.id)).await.unwrap().unwrap())
                .unwrap();
        assert_eq!(tombstone.version, 2);
        assert!(matches!(
            store.delete(&saved.id).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_field_updates_bump_version() {
        let (store, _host, _db) = store_with(encrypted());
        let saved = store.save(sample("Work")).await.unwrap();

        let favorite = store.toggle_favorite(&saved.id).await.unwrap();
        assert!(favorite.favorite);
        assert_eq!(favorite.version, 2);

        let moved = store.update_category(&saved.id, "<b>reading</b>").await.unwrap();
        assert_eq!(moved.category, "breading/b");
        assert_eq!(moved.version, 3);
        assert!(moved.favorite);

        let reloaded = store.load(&saved.id).await.unwrap().session;
        assert_eq!(reloaded.version, 3);

        assert!(store.update_category(&saved.id, "  ").await.is_err());
    }

    #[tokio::test]
    async fn test_search_and_category_filters() {
        let (store, _host, _db) = store_with(StoreOptions::default());
        store.save(sample("Research")).await.unwrap();
        store
            .save(Session::new(
                "Shopping",
                "personal",
                vec![Tab::new("https://shop.example/", "Cart")],
            ))
            .await
            .unwrap();

        assert_eq!(store.search("DOCS").len(), 1);
        assert_eq!(store.search("cart")[0].name, "Shopping");
        assert_eq!(store.search("").len(), 2);
        assert_eq!(store.by_category("Personal").len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_warms_cache() {
        let (store, host, db) = store_with(StoreOptions::default());
        store.save(sample("Persisted")).await.unwrap();

        let fresh = SessionStore::new(
            db.clone(),
            SecurityManager::new(),
            host.context(),
            StoreOptions::default(),
        );
        assert!(fresh.list().is_empty());
        assert_eq!(fresh.initialize().await.unwrap(), 1);
        assert_eq!(fresh.list()[0].name, "Persisted");
    }

    #[tokio::test]
    async fn test_export_import() {
        let (store, _host, _db) = store_with(StoreOptions::default());
        store.save(sample("One")).await.unwrap();
        store.save(sample("Two")).await.unwrap();

        let exported = store.export_all().await.unwrap();
        assert_eq!(exported.len(), 2);

        let (target, _host, _db) = store_with(StoreOptions::default());
        let mut records: Vec<Value> = exported
            .iter()
            .map(|s| serde_json::to_value(s).unwrap())
            .collect();
        records.insert(1, json!({ "name": "No tabs" }));
        records.push(json!("not a session"));

        let outcomes = target.import_all(records).await;
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert!(outcomes[2].success);
        assert!(!outcomes[3].success);

        let new_ids: Vec<&str> = outcomes.iter().filter_map(|o| o.id.as_deref()).collect();
        assert!(exported.iter().all(|s| !new_ids.contains(&s.id.as_str())));
        assert_eq!(target.list().len(), 2);
    }
}
