//! TabVault Data Model
//!
//! The record kinds every engine component shares: sessions and their tabs,
//! cookies, and the interfaces of the host collaborators (cookie jar, tab
//! host, notifier, clock) that the engine drives but does not own.

mod classify;
mod clock;
mod cookie;
pub mod host;
mod session;
mod tab;

pub use classify::{classify, ClassifiedError, ErrorCode, ErrorInfo};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cookie::{domain_matches, Cookie, SameSite, MAX_COOKIE_BYTES};
pub use host::{
    CookieFilter, CookieJar, HostContext, HostError, Notification, NotificationPriority,
    Notifier, OpenTab, TabHost,
};
pub use session::{Session, DEFAULT_SESSION_TTL_DAYS};
pub use tab::Tab;
