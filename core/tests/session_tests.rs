//! End-to-end tests of the signed cookie session interface.

#![allow(clippy::unwrap_used)]

use chrono::Duration;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use sigil_core::session::{TimedSerializer, SESSION_SALT};
use sigil_core::{AppConfig, Clock, ContextError, SameSite};
use sigil_testing::properties::session_data;
use sigil_testing::{
    secret_app, test_app, test_app_with_manual_clock, test_epoch, DeletedCookie, MockRequest,
    MockResponse, TEST_SECRET,
};

fn secret_config() -> AppConfig {
    AppConfig::new().with_secret_key(TEST_SECRET)
}

#[test]
fn test_permanent_session_scenario() {
    let config = secret_config().with_permanent_session_lifetime(Duration::hours(1));
    let (app, clock) = test_app_with_manual_clock(config);

    let mut session = app.open_session(&MockRequest::new());
    assert!(session.is_empty());
    session.insert("user_id", 42).unwrap();
    session.set_permanent(true).unwrap();

    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);

    let cookie = response.cookie("session").unwrap();
    assert_eq!(cookie.expires, Some(clock.now() + Duration::hours(1)));
    assert!(cookie.httponly);
    assert!(!cookie.secure);
    assert_eq!(cookie.path, "/");
    assert_eq!(cookie.domain, None);
    assert_eq!(response.vary(), ["Cookie".to_string()]);

    let mut reopened = app.open_session(&MockRequest::from_response(&response));
    assert_eq!(reopened.get("user_id"), Some(&json!(42)));
    assert!(reopened.permanent());
    assert_eq!(reopened.len(), 1);
    assert!(!reopened.modified());
}

#[test]
fn test_no_secret_key_scenario() {
    let app = test_app(AppConfig::new());
    let mut session = app.open_session(&MockRequest::new().with_cookie("session", "anything"));

    assert!(session.is_null());
    assert_eq!(session.get("user_id"), None);
    assert_eq!(
        session.insert("user_id", 42),
        Err(ContextError::SessionUnavailable)
    );

    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);
    assert!(response.is_untouched());
}

#[test]
fn test_server_name_domain_scenario() {
    let config = secret_config()
        .with_server_name("example.com:5000")
        .with_application_root("/");
    let app = test_app(config);

    let mut session = app.open_session(&MockRequest::new());
    session.insert("k", "v").unwrap();
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);

    let cookie = response.cookie("session").unwrap();
    assert_eq!(cookie.domain.as_deref(), Some(".example.com"));
    assert_eq!(cookie.path, "/");
}

#[test]
fn test_cookie_attributes_follow_config() {
    let config = secret_config()
        .with_cookie_name("sid")
        .with_cookie_path("/app")
        .with_cookie_domain("app.example.org")
        .with_httponly(false)
        .with_secure(true)
        .with_samesite(SameSite::Strict);
    let app = test_app(config);

    let mut session = app.open_session(&MockRequest::new());
    session.insert("k", 1).unwrap();
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);

    let cookie = response.cookie("sid").unwrap();
    assert!(!cookie.httponly);
    assert!(cookie.secure);
    assert_eq!(cookie.samesite, Some(SameSite::Strict));
    assert_eq!(cookie.path, "/app");
    assert_eq!(cookie.domain.as_deref(), Some("app.example.org"));
    assert_eq!(cookie.expires, None);
}

#[test]
fn test_expired_cookie_opens_empty() {
    let config = secret_config().with_permanent_session_lifetime(Duration::hours(1));
    let (app, clock) = test_app_with_manual_clock(config);

    let mut session = app.open_session(&MockRequest::new());
    session.insert("user_id", 42).unwrap();
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);
    let request = MockRequest::from_response(&response);

    clock.advance(Duration::hours(1));
    assert!(app.open_session(&request).contains_key("user_id"));

    clock.advance(Duration::seconds(1));
    let expired = app.open_session(&request);
    assert!(expired.is_empty());
    assert!(!expired.is_null());
}

#[test]
fn test_rotated_secret_opens_empty() {
    let app = secret_app();
    let mut session = app.open_session(&MockRequest::new());
    session.insert("k", 1).unwrap();
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);

    let rotated = test_app(AppConfig::new().with_secret_key("another"));
    assert!(rotated
        .open_session(&MockRequest::from_response(&response))
        .is_empty());
}

#[test]
fn test_garbage_and_empty_cookies_open_empty() {
    let app = secret_app();
    for value in ["", "garbage", "a.b.c", "...", "eyJ9.AA.AA"] {
        let session = app.open_session(&MockRequest::new().with_cookie("session", value));
        assert!(session.is_empty(), "{value:?} should open empty");
        assert!(!session.is_null());
    }
}

#[test]
fn test_non_object_payload_opens_empty() {
    let app = secret_app();
    let signed = TimedSerializer::new(TEST_SECRET.as_bytes(), SESSION_SALT.as_bytes())
        .dumps(&json!([1, 2, 3]), test_epoch())
        .unwrap();
    let session = app.open_session(&MockRequest::new().with_cookie("session", signed));
    assert!(session.is_empty());
}

#[test]
fn test_untouched_empty_session_leaves_response_alone() {
    let app = secret_app();
    let session = app.open_session(&MockRequest::new());
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);
    app.save_session(&session, &mut response);
    assert!(response.is_untouched());
}

#[test]
fn test_cleared_session_deletes_with_same_domain_and_path() {
    let config = secret_config()
        .with_server_name("example.com")
        .with_cookie_path("/");
    let app = test_app(config);

    let mut session = app.open_session(&MockRequest::new());
    session.insert("user_id", 1).unwrap();
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);
    let set = response.cookie("session").unwrap().clone();

    let mut session = app.open_session(&MockRequest::from_response(&response));
    session.clear().unwrap();
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);

    assert!(response.set_cookies().is_empty());
    assert_eq!(
        response.deleted_cookies(),
        [DeletedCookie {
            name: "session".to_string(),
            domain: set.domain,
            path: set.path,
        }]
    );
    assert!(response.vary().is_empty());
}

#[test]
fn test_read_only_access_adds_vary_without_cookie() {
    let app = secret_app();
    let mut session = app.open_session(&MockRequest::new());
    session.insert("k", 1).unwrap();
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);

    let mut session = app.open_session(&MockRequest::from_response(&response));
    assert_eq!(session.get("k"), Some(&json!(1)));
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);

    assert_eq!(response.vary(), ["Cookie".to_string()]);
    assert!(response.set_cookies().is_empty());
}

#[test]
fn test_permanent_session_refreshes_each_request() {
    for refresh in [true, false] {
        let app = test_app(secret_config().with_refresh_each_request(refresh));
        let mut session = app.open_session(&MockRequest::new());
        session.set_permanent(true).unwrap();
        let mut response = MockResponse::new();
        app.save_session(&session, &mut response);

        let session = app.open_session(&MockRequest::from_response(&response));
        assert!(session.permanent());
        let mut response = MockResponse::new();
        app.save_session(&session, &mut response);
        assert_eq!(response.cookie("session").is_some(), refresh);
    }
}

#[test]
fn test_mark_modified_forces_cookie() {
    let app = secret_app();
    let mut session = app.open_session(&MockRequest::new());
    session.insert("k", 1).unwrap();
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);

    let mut session = app.open_session(&MockRequest::from_response(&response));
    assert!(!session.modified());
    session.mark_modified();
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);
    assert!(response.cookie("session").is_some());
}

proptest! {
    #[test]
    fn prop_session_round_trips(data in session_data(), permanent in any::<bool>()) {
        let app = secret_app();
        let mut session = app.open_session(&MockRequest::new());
        session.extend(data.clone()).unwrap();
        session.set_permanent(permanent).unwrap();

        let mut response = MockResponse::new();
        app.save_session(&session, &mut response);
        let reopened = app.open_session(&MockRequest::from_response(&response));

        prop_assert_eq!(reopened.data(), &data);
        prop_assert_eq!(reopened.permanent(), permanent);
    }

    #[test]
    fn prop_tampered_cookie_opens_empty(
        data in session_data(),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let app = secret_app();
        let mut session = app.open_session(&MockRequest::new());
        session.extend(data).unwrap();
        session.insert("user_id", 1).unwrap();
        let mut response = MockResponse::new();
        app.save_session(&session, &mut response);
        let signed = response.cookie("session").unwrap().value.clone();

        let mut bytes = signed.into_bytes();
        let at = index.index(bytes.len());
        bytes[at] ^= 1 << bit;
        let tampered = String::from_utf8(bytes);
        prop_assume!(tampered.is_ok());

        let session = app.open_session(
            &MockRequest::new().with_cookie("session", tampered.unwrap()),
        );
        prop_assert!(session.is_empty());
        prop_assert!(!session.is_null());
    }
}

#[test]
fn test_reserved_looking_keys_round_trip() {
    let app = secret_app();
    let mut session = app.open_session(&MockRequest::new());
    session.insert("_permanent", "yes").unwrap();
    session.insert("k", 1).unwrap();
    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);

    let reopened = app.open_session(&MockRequest::from_response(&response));
    assert_eq!(reopened.data(), session.data());
    assert!(!reopened.permanent());
}

#[test]
fn test_signed_object_without_envelope_opens_empty() {
    let app = secret_app();
    let mut data = Map::new();
    data.insert("user_id".to_string(), json!(42));
    let signed = TimedSerializer::new(TEST_SECRET.as_bytes(), SESSION_SALT.as_bytes())
        .dumps(&Value::Object(data), test_epoch())
        .unwrap();
    let session = app.open_session(&MockRequest::new().with_cookie("session", signed));
    assert!(session.is_empty());
    assert!(!session.is_null());
}

#[test]
fn test_unbounded_lifetime_saves_browser_session_cookie() {
    let app = test_app(secret_config().with_permanent_session_lifetime(Duration::MAX));
    let mut session = app.open_session(&MockRequest::new());
    session.insert("user_id", 42).unwrap();
    session.set_permanent(true).unwrap();

    let mut response = MockResponse::new();
    app.save_session(&session, &mut response);

    let cookie = response.cookie("session").unwrap();
    assert_eq!(cookie.expires, None);
    let reopened = app.open_session(&MockRequest::from_response(&response));
    assert!(reopened.permanent());
    assert_eq!(reopened.data(), session.data());
}
