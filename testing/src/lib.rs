//! # Sigil Testing
//!
//! Testing utilities and helpers for Sigil applications.
//!
//! This crate provides:
//! - Deterministic clocks
//! - A mock request and a recording mock response for the session interface
//! - Application builders for common test setups
//! - Property-based testing strategies for session data
//!
//! ## Example
//!
//! ```
//! use sigil_core::AppConfig;
//! use sigil_testing::{test_app, MockRequest, MockResponse};
//!
//! let app = test_app(AppConfig::new().with_secret_key("s3cr3t"));
//!
//! let mut session = app.open_session(&MockRequest::new());
//! session.insert("user_id", 42).unwrap();
//!
//! let mut response = MockResponse::new();
//! app.save_session(&session, &mut response);
//!
//! let next = MockRequest::from_response(&response);
//! let mut reopened = app.open_session(&next);
//! assert_eq!(reopened.get_as::<u32>("user_id"), Some(42));
//! ```

use chrono::{DateTime, Utc};
use sigil_core::environment::Clock;

/// Mock implementations of the collaborator traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use sigil_core::{SessionCookie, SessionRequest, SessionResponse};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use sigil_testing::mocks::FixedClock;
    /// use sigil_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// 2025-01-01 00:00:00 UTC.
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// A clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the application. Resolution is one second, which is also
    /// the resolution of signed cookie timestamps.
    ///
    /// ```
    /// use sigil_testing::mocks::ManualClock;
    /// use sigil_core::environment::Clock;
    /// use chrono::Duration;
    ///
    /// let clock = ManualClock::default();
    /// let handle = clock.clone();
    /// let before = clock.now();
    /// handle.advance(Duration::hours(1));
    /// assert_eq!(clock.now() - before, Duration::hours(1));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        seconds: Arc<AtomicI64>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(test_epoch())
        }
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                seconds: Arc::new(AtomicI64::new(time.timestamp())),
            }
        }

        /// Move the clock forward (or back, for a negative duration).
        pub fn advance(&self, by: Duration) {
            self.seconds.fetch_add(by.num_seconds(), Ordering::SeqCst);
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            self.seconds.store(time.timestamp(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp(self.seconds.load(Ordering::SeqCst), 0).unwrap_or_default()
        }
    }

    /// Request carrying nothing but cookies.
    #[derive(Debug, Clone, Default)]
    pub struct MockRequest {
        cookies: HashMap<String, String>,
    }

    impl MockRequest {
        /// A request without cookies.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a cookie.
        #[must_use]
        pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
            self.cookies.insert(name.into(), value.into());
            self
        }

        /// The request a browser would send after receiving `response`:
        /// every set cookie is carried over, deleted cookies are dropped.
        #[must_use]
        pub fn from_response(response: &MockResponse) -> Self {
            let mut request = Self::new();
            for cookie in response.set_cookies() {
                request.cookies.insert(cookie.name.clone(), cookie.value.clone());
            }
            for deleted in response.deleted_cookies() {
                request.cookies.remove(&deleted.name);
            }
            request
        }
    }

    impl SessionRequest for MockRequest {
        fn cookie(&self, name: &str) -> Option<&str> {
            self.cookies.get(name).map(String::as_str)
        }
    }

    /// A recorded `delete_cookie` instruction.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct DeletedCookie {
        /// Cookie name
        pub name: String,
        /// `Domain` the deletion was issued for
        pub domain: Option<String>,
        /// `Path` the deletion was issued for
        pub path: String,
    }

    /// Response that records every instruction from the session interface.
    #[derive(Debug, Clone, Default)]
    pub struct MockResponse {
        set: Vec<SessionCookie>,
        deleted: Vec<DeletedCookie>,
        vary: Vec<String>,
    }

    impl MockResponse {
        /// An untouched response.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Every `set_cookie` call, in order.
        #[must_use]
        pub fn set_cookies(&self) -> &[SessionCookie] {
            &self.set
        }

        /// The last cookie set under `name`.
        #[must_use]
        pub fn cookie(&self, name: &str) -> Option<&SessionCookie> {
            self.set.iter().rev().find(|c| c.name == name)
        }

        /// Every `delete_cookie` call, in order.
        #[must_use]
        pub fn deleted_cookies(&self) -> &[DeletedCookie] {
            &self.deleted
        }

        /// Headers listed in `Vary`.
        #[must_use]
        pub fn vary(&self) -> &[String] {
            &self.vary
        }

        /// Whether no instruction was recorded at all.
        #[must_use]
        pub fn is_untouched(&self) -> bool {
            self.set.is_empty() && self.deleted.is_empty() && self.vary.is_empty()
        }
    }

    impl SessionResponse for MockResponse {
        fn set_cookie(&mut self, cookie: SessionCookie) {
            self.set.push(cookie);
        }

        fn delete_cookie(&mut self, name: &str, domain: Option<&str>, path: &str) {
            self.deleted.push(DeletedCookie {
                name: name.to_string(),
                domain: domain.map(str::to_string),
                path: path.to_string(),
            });
        }

        fn add_vary(&mut self, header: &str) {
            if !self.vary.iter().any(|h| h.eq_ignore_ascii_case(header)) {
                self.vary.push(header.to_string());
            }
        }
    }
}

/// Application builders for common test setups.
pub mod helpers {
    use super::mocks::{test_clock, ManualClock};
    use sigil_core::{App, AppConfig};

    /// Secret used by [`secret_app`].
    pub const TEST_SECRET: &str = "s3cr3t";

    /// An application named `test` running on [`test_clock`].
    #[must_use]
    pub fn test_app(config: AppConfig) -> App {
        App::builder("test", config).with_clock(test_clock()).build()
    }

    /// An application with [`TEST_SECRET`] configured.
    #[must_use]
    pub fn secret_app() -> App {
        test_app(AppConfig::new().with_secret_key(TEST_SECRET))
    }

    /// An application driven by a [`ManualClock`]; the returned clock shares
    /// its time with the application.
    #[must_use]
    pub fn test_app_with_manual_clock(config: AppConfig) -> (App, ManualClock) {
        let clock = ManualClock::default();
        let app = App::builder("test", config).with_clock(clock.clone()).build();
        (app, clock)
    }

    /// Install a `tracing` subscriber that writes through the test harness.
    /// Safe to call from every test.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sigil_core=debug")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Arbitrary JSON values without floats, nested up to three levels.
    pub fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[ -~]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    /// Arbitrary session data, including keys such as `_permanent` or `p`.
    pub fn session_data() -> impl Strategy<Value = Map<String, Value>> {
        let key = prop_oneof![
            "[a-z_][a-z0-9_]{0,7}",
            Just("_permanent".to_string()),
            Just("p".to_string()),
            Just("d".to_string()),
        ];
        prop::collection::btree_map(key, json_value(), 0..6)
            .prop_map(|m| m.into_iter().collect())
    }
}

// Re-export commonly used items
pub use helpers::{init_tracing, secret_app, test_app, test_app_with_manual_clock, TEST_SECRET};
pub use mocks::{
    test_clock, test_epoch, DeletedCookie, FixedClock, ManualClock, MockRequest, MockResponse,
};
