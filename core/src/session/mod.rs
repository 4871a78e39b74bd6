//! Signed cookie sessions.
//!
//! - [`value`]: the [`Session`] mapping with its `permanent`/`modified`/`accessed` flags
//! - [`signer`]: timestamped HMAC signing of the cookie payload
//! - [`cookie`]: domain, path and expiry of the session cookie
//! - [`interface`]: [`SessionInterface`] and the signed-cookie implementation

pub mod cookie;
pub mod interface;
pub mod signer;
pub mod value;

pub use cookie::{CookieDomainWarning, DomainResolution};
pub use interface::{SecureCookieSessionInterface, SessionInterface, SESSION_SALT};
pub use signer::{SignatureError, TimedSerializer};
pub use value::{Session, SessionHandle};
