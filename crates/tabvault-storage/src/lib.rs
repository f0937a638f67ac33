//! TabVault Storage Layer
//!
//! A durable key-value store for session records, backups, share tokens and
//! bookkeeping. Values are JSON documents; every key maps to exactly one value.
//! Single-key writes are atomic, multi-key writes are batched in one SQLite
//! transaction but callers must not rely on cross-call atomicity.

mod database;
mod error;
pub mod keys;
mod migrations;
mod store;

pub use database::Database;
pub use error::StorageError;
pub use store::KeyValueStore;

pub type Result<T> = std::result::Result<T, StorageError>;
