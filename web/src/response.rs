//! Writing session instructions into HTTP response headers.

use axum::http::{
    header::{SET_COOKIE, VARY},
    HeaderMap, HeaderValue,
};
use cookie::Cookie;
use sigil_core::{SameSite, SessionCookie, SessionResponse};
use time::{Duration, OffsetDateTime};

/// [`SessionResponse`] over the headers of an outgoing response.
///
/// Cookies are rendered with the `cookie` crate and appended as separate
/// `Set-Cookie` headers.
///
/// ```
/// use axum::http::HeaderMap;
/// use sigil_core::SessionResponse;
/// use sigil_web::ResponseCookies;
///
/// let mut headers = HeaderMap::new();
/// ResponseCookies::new(&mut headers).add_vary("Cookie");
/// assert_eq!(headers["vary"], "Cookie");
/// ```
#[derive(Debug)]
pub struct ResponseCookies<'a> {
    headers: &'a mut HeaderMap,
}

impl<'a> ResponseCookies<'a> {
    /// Write into `headers`.
    pub fn new(headers: &'a mut HeaderMap) -> Self {
        Self { headers }
    }

    fn append(&mut self, cookie: &Cookie<'_>) {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                self.headers.append(SET_COOKIE, value);
            }
            Err(error) => {
                tracing::error!(%error, name = cookie.name(), "Cookie is not a valid header value");
            }
        }
    }
}

const fn same_site(value: SameSite) -> cookie::SameSite {
    match value {
        SameSite::Strict => cookie::SameSite::Strict,
        SameSite::Lax => cookie::SameSite::Lax,
        SameSite::None => cookie::SameSite::None,
    }
}

impl SessionResponse for ResponseCookies<'_> {
    fn set_cookie(&mut self, cookie: SessionCookie) {
        let mut builder = Cookie::build((cookie.name, cookie.value))
            .path(cookie.path)
            .http_only(cookie.httponly)
            .secure(cookie.secure);

        if let Some(domain) = cookie.domain {
            builder = builder.domain(domain);
        }
        if let Some(expires) = cookie
            .expires
            .and_then(|at| OffsetDateTime::from_unix_timestamp(at.timestamp()).ok())
        {
            builder = builder.expires(expires);
        }
        if let Some(value) = cookie.samesite {
            builder = builder.same_site(same_site(value));
        }

        self.append(&builder.build());
    }

    fn delete_cookie(&mut self, name: &str, domain: Option<&str>, path: &str) {
        let mut builder = Cookie::build((name.to_string(), String::new()))
            .path(path.to_string())
            .max_age(Duration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH);

        if let Some(domain) = domain {
            builder = builder.domain(domain.to_string());
        }

        self.append(&builder.build());
    }

    fn add_vary(&mut self, header: &str) {
        let present = self
            .headers
            .get_all(VARY)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .any(|value| value == "*" || value.eq_ignore_ascii_case(header));
        if present {
            return;
        }

        match HeaderValue::from_str(header) {
            Ok(value) => {
                self.headers.append(VARY, value);
            }
            Err(error) => tracing::error!(%error, header, "Vary entry is not a valid header value"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_set_cookie_renders_attributes() {
        let mut headers = HeaderMap::new();
        ResponseCookies::new(&mut headers).set_cookie(SessionCookie {
            name: "session".to_string(),
            value: "abc.def.ghi".to_string(),
            expires: Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).single(),
            httponly: true,
            domain: Some(".example.com".to_string()),
            path: "/".to_string(),
            secure: true,
            samesite: Some(SameSite::Lax),
        });

        let rendered = set_cookies(&headers);
        assert_eq!(rendered.len(), 1);
        let cookie = Cookie::parse(rendered[0].clone()).unwrap();
        assert_eq!(cookie.name(), "session");
        assert_eq!(cookie.value(), "abc.def.ghi");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.same_site(), Some(cookie::SameSite::Lax));
        assert_eq!(
            cookie.expires_datetime().map(OffsetDateTime::unix_timestamp),
            Some(1_735_693_200)
        );
    }

    #[test]
    fn test_browser_session_cookie_has_no_expiry() {
        let mut headers = HeaderMap::new();
        ResponseCookies::new(&mut headers).set_cookie(SessionCookie {
            name: "session".to_string(),
            value: "v".to_string(),
            expires: None,
            httponly: false,
            domain: None,
            path: "/app".to_string(),
            secure: false,
            samesite: None,
        });

        let cookie = Cookie::parse(set_cookies(&headers).remove(0)).unwrap();
        assert_eq!(cookie.expires(), None);
        assert_eq!(cookie.http_only(), None);
        assert_eq!(cookie.domain(), None);
        assert_eq!(cookie.path(), Some("/app"));
    }

    #[test]
    fn test_delete_cookie_expires_immediately() {
        let mut headers = HeaderMap::new();
        ResponseCookies::new(&mut headers).delete_cookie("session", Some("example.com"), "/");

        let cookie = Cookie::parse(set_cookies(&headers).remove(0)).unwrap();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(
            cookie.expires_datetime(),
            Some(OffsetDateTime::UNIX_EPOCH)
        );
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn test_vary_is_add_if_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(VARY, HeaderValue::from_static("Accept-Encoding, cookie"));
        ResponseCookies::new(&mut headers).add_vary("Cookie");
        assert_eq!(headers.get_all(VARY).iter().count(), 1);

        let mut headers = HeaderMap::new();
        headers.insert(VARY, HeaderValue::from_static("*"));
        ResponseCookies::new(&mut headers).add_vary("Cookie");
        assert_eq!(headers.get_all(VARY).iter().count(), 1);

        let mut headers = HeaderMap::new();
        headers.insert(VARY, HeaderValue::from_static("Accept"));
        let mut cookies = ResponseCookies::new(&mut headers);
        cookies.add_vary("Cookie");
        cookies.add_vary("Cookie");
        let values: Vec<_> = headers.get_all(VARY).iter().collect();
        assert_eq!(values, ["Accept", "Cookie"]);
    }
}
