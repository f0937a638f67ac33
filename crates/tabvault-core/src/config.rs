//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tabvault_security::MAX_SESSION_LIFETIME_DAYS;
use tabvault_sharing::MAX_SHARE_TTL_HOURS;

use crate::error::CoreError;
use crate::Result;

pub const MAX_BACKUP_RETENTION_DAYS: i64 = 3650;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the database file
    pub database_path: PathBuf,
    /// Seal session records at rest
    pub encrypt_sessions: bool,
    /// Whether cookies are imported from an https context
    pub secure_context: bool,
    /// Base64 32-byte key that wraps per-record keys
    pub master_key: Option<String>,
    /// Lifetime given to new sessions without an explicit expiry
    pub session_ttl_days: i64,
    pub share_ttl_hours: i64,
    pub backup_retention_days: i64,
    pub lock_timeout_ms: u64,
    /// Upper bound on stored bytes; unbounded when absent
    pub storage_quota_bytes: Option<u64>,
    pub registry_url: Option<String>,
    pub registry_api_key: Option<String>,
    pub sync_endpoint: Option<String>,
    pub sync_token: Option<String>,
    pub maintenance_interval_secs: u64,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join("tabvault.db"),
            encrypt_sessions: true,
            secure_context: true,
            master_key: None,
            session_ttl_days: 30,
            share_ttl_hours: 24,
            backup_retention_days: 7,
            lock_timeout_ms: 5_000,
            storage_quota_bytes: Some(10 * 1024 * 1024),
            registry_url: None,
            registry_api_key: None,
            sync_endpoint: None,
            sync_token: None,
            maintenance_interval_secs: 60 * 60,
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("TabVault"))
            .unwrap_or_else(|| PathBuf::from(".tabvault"))
    }

    /// Missing keys take their default values
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;

        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Range checks for every duration setting
    pub fn check(&self) -> Result<()> {
        in_range("session_ttl_days", self.session_ttl_days, MAX_SESSION_LIFETIME_DAYS)?;
        in_range("share_ttl_hours", self.share_ttl_hours, MAX_SHARE_TTL_HOURS)?;
        in_range(
            "backup_retention_days",
            self.backup_retention_days,
            MAX_BACKUP_RETENTION_DAYS,
        )?;
        if self.maintenance_interval_secs == 0 {
            return Err(CoreError::Config(
                "maintenance_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn in_range(name: &str, value: i64, max: i64) -> Result<()> {
    if value <= 0 || value > max {
        return Err(CoreError::Config(format!(
            "{name} must be between 1 and {max}, got {value}"
        )));
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new(PathBuf::from("/tmp/tv"));
        assert_eq!(config.database_path, PathBuf::from("/tmp/tv/tabvault.db"));
        assert_eq!(config.share_ttl_hours, 24);
        assert_eq!(config.lock_timeout_ms, 5_000);
        assert!(config.encrypt_sessions);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            database_path = "/var/lib/tabvault/db.sqlite"
            encrypt_sessions = false
            share_ttl_hours = 2
            registry_url = "https://registry.example"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/tabvault/db.sqlite"));
        assert!(!config.encrypt_sessions);
        assert_eq!(config.share_ttl_hours, 2);
        assert_eq!(config.backup_retention_days, 7);
        assert_eq!(config.registry_url.as_deref(), Some("https://registry.example"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_toml_str("share_ttl_hours = 0").is_err());
        assert!(Config::from_toml_str("share_ttl_hours = 1000000000000").is_err());
        assert!(Config::from_toml_str("session_ttl_days = 366").is_err());
        assert!(Config::from_toml_str("backup_retention_days = 9223372036854775807").is_err());
        assert!(Config::from_toml_str("share_ttl_hours = 8760").is_ok());
        assert!(Config::from_toml_str("encrypt_sessions = \"yes\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tabvault.toml");
        std::fs::write(&path, "lock_timeout_ms = 250\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.lock_timeout_ms, 250);
        assert!(Config::load(dir.path().join("missing.toml")).is_err());
    }
}
