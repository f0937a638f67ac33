//! TabVault Session Sharing
//!
//! A shared session is a package of the session and its per-tab cookies,
//! optionally encrypted, stored under a `share_<timestamp>_<random>` token.
//! Tokens expire (checked when accessed), can be single-use, and can be
//! revoked. A remote token registry makes shares reachable from other devices.

mod error;
mod history;
mod package;
mod protocol;
mod registry;

pub use error::SharingError;
pub use history::{AccessEntry, ACCESS_WARNING_THRESHOLD};
pub use package::{ShareMeta, ShareMetadata, SharePackage, ShareSummary, SharedRecord};
pub use protocol::{AccessResult, ShareOptions, ShareResult, SharingProtocol, MAX_SHARE_TTL_HOURS};
pub use registry::{HttpTokenRegistry, MemoryTokenRegistry, TokenRegistry};

pub type Result<T> = std::result::Result<T, SharingError>;
