//! Engine context
//!
//! Owns the collaborators and the components built on them, and routes
//! commands to the component that serves them.

use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

use tabvault_cookies::CookieTransport;
use tabvault_model::{HostContext, Session};
use tabvault_security::SecurityManager;
use tabvault_session::{MaintenanceReport, SessionStore, StoreOptions};
use tabvault_sharing::{HttpTokenRegistry, SharingProtocol, TokenRegistry};
use tabvault_storage::{Database, KeyValueStore};
use tabvault_sync::{HttpSyncTransport, SyncClient, SyncReport, SyncTransport};

use crate::command::{Command, CommandResponse};
use crate::config::Config;
use crate::error::CoreError;
use crate::Result;

pub struct Engine {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    host: HostContext,
    cookies: CookieTransport,
    sessions: SessionStore,
    sharing: SharingProtocol,
    sync: Option<SyncClient>,
}

impl Engine {
    /// Open the on-disk database named by `config`
    pub fn open(config: Config, host: HostContext) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut db = Database::open(&config.database_path)?;
        if let Some(quota) = config.storage_quota_bytes {
            db = db.with_quota(quota);
        }

        tracing::info!(path = %config.database_path.display(), "Opened database");
        Self::with_store(config, Arc::new(db), host)
    }

    pub fn in_memory(config: Config, host: HostContext) -> Result<Self> {
        let mut db = Database::open_in_memory()?;
        if let Some(quota) = config.storage_quota_bytes {
            db = db.with_quota(quota);
        }
        Self::with_store(config, Arc::new(db), host)
    }

    pub fn with_store(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        host: HostContext,
    ) -> Result<Self> {
        config.check()?;

        let security = match &config.master_key {
            Some(key) => SecurityManager::from_base64_master_key(key)?,
            None => SecurityManager::new(),
        };

        let options = StoreOptions {
            encrypt: config.encrypt_sessions,
            lock_timeout: std::time::Duration::from_millis(config.lock_timeout_ms),
            backup_retention: days(config.backup_retention_days)?,
            secure_context: config.secure_context,
            ..StoreOptions::default()
        };

        let cookies = CookieTransport::new(Arc::clone(&store), host.clone(), config.secure_context);
        let sessions = SessionStore::new(
            Arc::clone(&store),
            security.clone(),
            host.clone(),
            options,
        );
        let mut sharing = SharingProtocol::new(
            sessions.clone(),
            Arc::clone(&store),
            security,
            host.clone(),
            cookies.clone(),
            Duration::try_hours(config.share_ttl_hours)
                .ok_or_else(|| CoreError::Config("share_ttl_hours out of range".into()))?,
        );
        if let Some(url) = &config.registry_url {
            let registry = HttpTokenRegistry::new(url, config.registry_api_key.clone())?;
            sharing = sharing.with_registry(Arc::new(registry));
        }

        let sync = match &config.sync_endpoint {
            Some(endpoint) => {
                let transport = HttpSyncTransport::new(endpoint, config.sync_token.clone())?;
                Some(SyncClient::new(Arc::new(transport), Arc::clone(&store)))
            }
            None => None,
        };

        Ok(Self {
            config,
            store,
            host,
            cookies,
            sessions,
            sharing,
            sync,
        })
    }

    pub fn with_token_registry(mut self, registry: Arc<dyn TokenRegistry>) -> Self {
        self.sharing = self.sharing.with_registry(registry);
        self
    }

    pub fn with_sync_transport(mut self, transport: Arc<dyn SyncTransport>) -> Self {
        self.sync = Some(SyncClient::new(transport, Arc::clone(&self.store)));
        self
    }

    pub async fn initialize(&self) -> Result<usize> {
        let count = self.sessions.initialize().await?;
        tracing::info!(sessions = count, "Engine initialized");
        Ok(count)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn cookies(&self) -> &CookieTransport {
        &self.cookies
    }

    pub fn sharing(&self) -> &SharingProtocol {
        &self.sharing
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }

    /// One maintenance pass followed by a backup of every live session
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let report = self.sessions.maintenance().await?;
        let backed_up = self.sessions.backup_all().await?;

        tracing::info!(
            expired = report.expired,
            quarantined = report.quarantined,
            backups_pruned = report.backups_pruned,
            backed_up = backed_up,
            "Maintenance complete"
        );
        Ok(report)
    }

    pub async fn sync_now(&self) -> Result<SyncReport> {
        let client = self.sync.as_ref().ok_or(CoreError::SyncDisabled)?;
        let report = client.sync().await?;

        if report.updated + report.removed > 0 {
            self.sessions.initialize().await?;
        }
        Ok(report)
    }

    /// Run maintenance, and sync when configured, every
    /// `maintenance_interval_secs`. The first pass happens one interval
    /// after spawning.
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let period = std::time::Duration::from_secs(self.config.maintenance_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if let Err(e) = engine.run_maintenance().await {
                    tracing::warn!(error = %e, "Maintenance pass failed");
                }
                if engine.sync.is_some() {
                    if let Err(e) = engine.sync_now().await {
                        tracing::warn!(error = %e, "Background sync failed");
                    }
                }
            }
        })
    }

    /// Decode and run a JSON request
    pub async fn handle_json(&self, request: Value) -> CommandResponse {
        match Command::from_json(request) {
            Ok(command) => self.handle(command).await,
            Err(CoreError::UnknownAction(action)) => {
                tracing::warn!(action = %action, "Unknown action");
                CommandResponse::unknown_action()
            }
            Err(e) => CommandResponse::err(e.to_string()),
        }
    }

    pub async fn handle(&self, command: Command) -> CommandResponse {
        let action = command.action();
        tracing::debug!(action = action, "Handling command");

        let response = match command {
            Command::SaveSession { session } => {
                CommandResponse::from_result(self.sessions.save(self.stamp(session)).await)
            }
            Command::LoadSession { session_id } => {
                CommandResponse::from_result(self.sessions.load(&session_id).await)
            }
            Command::DeleteSession { session_id } => {
                match self.sessions.delete(&session_id).await {
                    Ok(()) => CommandResponse::done(),
                    Err(e) => CommandResponse::err(e.to_string()),
                }
            }
            Command::ExportSessions => {
                CommandResponse::from_result(self.sessions.export_all().await)
            }
            Command::ImportSessions { sessions } => {
                CommandResponse::ok(self.sessions.import_all(sessions).await)
            }
            Command::GetSessions => CommandResponse::ok(self.sessions.list()),
            Command::UpdateSessionCategory {
                session_id,
                category,
            } => CommandResponse::from_result(
                self.sessions.update_category(&session_id, &category).await,
            ),
            Command::GetSessionsByCategory { category } => {
                CommandResponse::ok(self.sessions.by_category(&category))
            }
            Command::SearchSessions { query } => CommandResponse::ok(self.sessions.search(&query)),
            Command::GetCategories => {
                CommandResponse::from_result(self.sessions.list_categories().await)
            }
            Command::AddCategory { category } => {
                CommandResponse::from_result(self.sessions.add_category(&category).await)
            }
            Command::RemoveCategory { category } => {
                CommandResponse::from_result(self.sessions.remove_category(&category).await)
            }
            Command::ToggleFavorite { session_id } => {
                CommandResponse::from_result(self.sessions.toggle_favorite(&session_id).await)
            }
            Command::ExportCookies { domain } => {
                CommandResponse::from_result(self.cookies.export_cookies(&domain).await)
            }
            Command::ImportCookies { cookies } => {
                CommandResponse::from_import(self.cookies.import_cookies(&cookies).await)
            }
            Command::ClearCookies { domain } => {
                CommandResponse::from_result(self.cookies.clear_cookies(&domain).await)
            }
            Command::BackupCookies { domain } => {
                CommandResponse::from_result(self.cookies.backup_cookies(domain.as_deref()).await)
            }
            Command::RestoreCookies { domain } => {
                match self.cookies.restore_cookies(domain.as_deref()).await {
                    Ok(report) => CommandResponse::from_import(report),
                    Err(e) => CommandResponse::err(e.to_string()),
                }
            }
            Command::GetDomains => CommandResponse::from_result(self.cookies.get_domains().await),
            Command::SaveSessionWithCookies { session } => CommandResponse::from_result(
                self.sessions.save_with_cookies(self.stamp(session)).await,
            ),
            Command::RestoreSessionWithCookies { session_id } => {
                CommandResponse::from_result(self.sessions.restore_with_cookies(&session_id).await)
            }
            Command::ShareSession {
                session_id,
                options,
            } => CommandResponse::from_result(self.sharing.share(&session_id, &options).await),
            Command::AccessSharedSession { token, accessor } => CommandResponse::from_result(
                self.sharing.access(&token, accessor.as_deref()).await,
            ),
            Command::RevokeSharedSession { token } => match self.sharing.revoke(&token).await {
                Ok(()) => CommandResponse::done(),
                Err(e) => CommandResponse::err(e.to_string()),
            },
            Command::ListSharedSessions => CommandResponse::from_result(self.sharing.list().await),
        };

        if !response.success {
            tracing::warn!(
                action = action,
                error = response.error.as_deref().unwrap_or_default(),
                "Command failed"
            );
        }
        response
    }

    /// Fill in timestamps a caller creating a session may leave out
    fn stamp(&self, mut session: Session) -> Session {
        let created_at = *session.created_at.get_or_insert_with(|| self.host.clock.now());
        if session.expires_at.is_none() {
            session.expires_at = Duration::try_days(self.config.session_ttl_days)
                .and_then(|ttl| created_at.checked_add_signed(ttl));
        }
        session
    }
}

fn days(value: i64) -> Result<Duration> {
    Duration::try_days(value)
        .ok_or_else(|| CoreError::Config(format!("{value} days is out of range")))
}
