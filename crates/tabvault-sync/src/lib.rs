//! TabVault Sync
//!
//! Best-effort convergence of session records between devices. Both sides
//! exchange their whole record set; the merge keeps tombstones and otherwise
//! the higher version, preferring the local copy on ties.

mod client;
mod error;
mod resolver;
mod retry;
mod transport;

pub use client::{SyncClient, SyncReport};
pub use error::SyncError;
pub use resolver::{merge, SyncEntry, SyncSet};
pub use retry::RetryPolicy;
pub use transport::{HttpSyncTransport, SyncTransport};

pub type Result<T> = std::result::Result<T, SyncError>;
