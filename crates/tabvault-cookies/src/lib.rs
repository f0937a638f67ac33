//! TabVault Cookie Transport
//!
//! Moves cookies between the host jar and TabVault payloads. Imports are
//! validated item by item; failures become warnings and only an import in which
//! nothing succeeded is reported as a failure.

mod check;
mod error;
mod report;
mod transport;

pub use check::{check_cookie, CookieRejection};
pub use error::CookieError;
pub use report::{ClearReport, CookieBackup, ImportReport};
pub use transport::{CookieTransport, RATE_LIMIT_REJECTIONS};

pub type Result<T> = std::result::Result<T, CookieError>;
