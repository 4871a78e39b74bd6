//! Request and response collaborators.
//!
//! The core never parses or renders HTTP itself. It reads cookies through
//! [`SessionRequest`] and writes cookie and `Vary` instructions through
//! [`SessionResponse`]; the web layer (or a test double) supplies both.

use crate::config::SameSite;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, Uri};
use std::collections::HashMap;

/// Read access to the cookies of an incoming request.
pub trait SessionRequest {
    /// Value of the named cookie, if the client sent one.
    fn cookie(&self, name: &str) -> Option<&str>;
}

/// Write access to the cookies and `Vary` header of an outgoing response.
pub trait SessionResponse {
    /// Emit a `Set-Cookie` instruction.
    fn set_cookie(&mut self, cookie: SessionCookie);

    /// Emit a cookie deletion for `name` scoped to `domain` and `path`.
    fn delete_cookie(&mut self, name: &str, domain: Option<&str>, path: &str);

    /// Add `header` to the `Vary` header unless it is already listed.
    fn add_vary(&mut self, header: &str);
}

/// A fully resolved session cookie, ready to be rendered by the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name
    pub name: String,
    /// Signed payload
    pub value: String,
    /// Absolute expiry; `None` for a browser-session cookie
    pub expires: Option<DateTime<Utc>>,
    /// `HttpOnly` flag
    pub httponly: bool,
    /// `Domain` attribute
    pub domain: Option<String>,
    /// `Path` attribute
    pub path: String,
    /// `Secure` flag
    pub secure: bool,
    /// `SameSite` attribute
    pub samesite: Option<SameSite>,
}

/// The incoming request as seen by a request context.
///
/// Owned exclusively by the [`RequestContext`](crate::context::RequestContext)
/// it is handed to.
#[derive(Debug, Clone, Default)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
}

impl Request {
    /// Create a request with no headers or cookies.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            cookies: HashMap::new(),
        }
    }

    /// Build from HTTP request parts and an already parsed cookie map.
    #[must_use]
    pub fn from_parts(parts: &http::request::Parts, cookies: HashMap<String, String>) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            cookies,
        }
    }

    /// Add a cookie.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Replace the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request target.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// All cookies sent by the client.
    #[must_use]
    pub const fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }
}

impl SessionRequest for Request {
    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}
