//! TabVault Session Store
//!
//! - Sessions are saved under fresh ids, optionally encrypted at rest
//! - Every save writes a checksummed backup; loads fall back to the newest one
//! - Mutations are serialized by one lock with a bounded wait
//! - Maintenance expires old sessions, quarantines damaged records and prunes
//!   backups

mod categories;
mod error;
mod maintenance;
mod package;
mod record;
mod report;
mod store;

pub use categories::DEFAULT_CATEGORIES;
pub use error::SessionError;
pub use package::{collect_tab_cookies, reopen_tabs, CookiePackage, TabCookies};
pub use record::{Backup, QuarantineEntry, SessionRecord, Tombstone};
pub use report::{ImportOutcome, LoadedSession, MaintenanceReport, RestoreReport, SavedWithCookies};
pub use store::{SessionStore, StoreOptions};

pub type Result<T> = std::result::Result<T, SessionError>;
