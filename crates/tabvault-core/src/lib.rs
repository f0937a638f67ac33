//! TabVault Core - Engine context and command surface
//!
//! Ties storage, security, cookie transport, session persistence, sharing and
//! sync together behind a single `Engine` that answers JSON commands.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;

pub use command::{Command, CommandResponse};
pub use config::Config;
pub use engine::Engine;
pub use error::CoreError;

pub use tabvault_cookies as cookies;
pub use tabvault_model as model;
pub use tabvault_security as security;
pub use tabvault_session as session;
pub use tabvault_sharing as sharing;
pub use tabvault_storage as storage;
pub use tabvault_sync as sync;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
