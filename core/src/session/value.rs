//! The session mapping and its tracking flags.

use crate::error::{ContextError, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};

/// Payload field holding the user data.
const DATA_FIELD: &str = "d";
/// Payload field holding the `permanent` flag, present only when set.
const PERMANENT_FIELD: &str = "p";

/// Client-held session data.
///
/// A JSON object plus three flags:
///
/// - `permanent`: the cookie outlives the browser session
/// - `modified`: the data changed since it was loaded
/// - `accessed`: the data was read or written at all
///
/// Reads through [`get`](Self::get) set `accessed`; every mutation sets both
/// `modified` and `accessed`. Values nested inside the map can be changed
/// through [`get_mut`](Self::get_mut), which marks the session modified up
/// front.
///
/// The null session (see [`Session::null`]) stands in when no secret key is
/// configured: it reads as empty and every mutation fails with
/// [`ContextError::SessionUnavailable`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    data: Map<String, Value>,
    permanent: bool,
    modified: bool,
    accessed: bool,
    null: bool,
}

impl Session {
    /// A fresh, empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A non-permanent session holding `data`, with no flags set.
    #[must_use]
    pub fn from_data(data: Map<String, Value>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// The disabled session used when no secret key is configured.
    #[must_use]
    pub fn null() -> Self {
        Self {
            null: true,
            ..Self::default()
        }
    }

    /// Whether this is the disabled stand-in session.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.null
    }

    /// Cookie sessions cannot tell whether they are new; always `false`.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        false
    }

    /// Whether the session survives browser restarts.
    #[must_use]
    pub const fn permanent(&self) -> bool {
        self.permanent
    }

    /// Whether the data changed since it was loaded.
    #[must_use]
    pub const fn modified(&self) -> bool {
        self.modified
    }

    /// Whether the data was read or written.
    #[must_use]
    pub const fn accessed(&self) -> bool {
        self.accessed
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// No keys and not permanent. An empty session is never written out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && !self.permanent
    }

    /// Whether `key` is present. Does not count as an access.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// The keys. Does not count as an access.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    /// The underlying map, without touching any flag.
    #[must_use]
    pub const fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Read a value.
    pub fn get(&mut self, key: &str) -> Option<&Value> {
        self.accessed = true;
        self.data.get(key)
    }

    /// Read and deserialize a value. Returns `None` if absent or of the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Mutable access to a nested value; marks the session modified.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SessionUnavailable`] on the null session.
    pub fn get_mut(&mut self, key: &str) -> Result<Option<&mut Value>> {
        self.touch()?;
        Ok(self.data.get_mut(key))
    }

    /// Store a value, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SessionUnavailable`] on the null session.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>> {
        self.touch()?;
        Ok(self.data.insert(key.into(), value.into()))
    }

    /// Remove a value, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SessionUnavailable`] on the null session.
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        self.touch()?;
        Ok(self.data.remove(key))
    }

    /// Return the value for `key`, inserting `default` first if absent.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SessionUnavailable`] on the null session.
    pub fn get_or_insert(&mut self, key: impl Into<String>, default: impl Into<Value>) -> Result<&Value> {
        self.touch()?;
        Ok(self.data.entry(key.into()).or_insert_with(|| default.into()))
    }

    /// Insert every pair from `entries`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SessionUnavailable`] on the null session.
    pub fn extend<I, K, V>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.touch()?;
        self.data
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        Ok(())
    }

    /// Remove every key and the permanent flag.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SessionUnavailable`] on the null session.
    pub fn clear(&mut self) -> Result<()> {
        self.touch()?;
        self.data.clear();
        self.permanent = false;
        Ok(())
    }

    /// Mark the session permanent (or not).
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SessionUnavailable`] on the null session.
    pub fn set_permanent(&mut self, permanent: bool) -> Result<()> {
        self.touch()?;
        self.permanent = permanent;
        Ok(())
    }

    /// Force the cookie to be re-issued on save.
    pub fn mark_modified(&mut self) {
        self.modified = true;
        self.accessed = true;
    }

    /// The signed payload: `{"d": data}`, plus `"p": true` when permanent.
    ///
    /// The flag sits beside the user map, so any user key round-trips.
    pub(crate) fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert(DATA_FIELD.to_string(), Value::Object(self.data.clone()));
        if self.permanent {
            payload.insert(PERMANENT_FIELD.to_string(), Value::Bool(true));
        }
        Value::Object(payload)
    }

    /// Inverse of [`to_payload`](Self::to_payload). `None` if `payload` has another shape.
    pub(crate) fn from_payload(payload: Value) -> Option<Self> {
        let Value::Object(mut payload) = payload else {
            return None;
        };
        let Some(Value::Object(data)) = payload.remove(DATA_FIELD) else {
            return None;
        };
        let permanent = match payload.remove(PERMANENT_FIELD) {
            None => false,
            Some(Value::Bool(permanent)) => permanent,
            Some(_) => return None,
        };

        Some(Self {
            data,
            permanent,
            ..Self::default()
        })
    }

    fn touch(&mut self) -> Result<()> {
        if self.null {
            return Err(ContextError::SessionUnavailable);
        }
        self.modified = true;
        self.accessed = true;
        Ok(())
    }
}

/// Shared handle to the session owned by a request context.
///
/// Cloning the handle does not copy the session. Each method takes the lock
/// for the duration of the call.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    /// Wrap a session.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    /// Run `f` with shared access to the session.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::LockPoisoned`] if a previous holder panicked.
    pub fn with<R>(&self, f: impl FnOnce(&Session) -> R) -> Result<R> {
        let guard = self.0.lock()?;
        Ok(f(&*guard))
    }

    /// Run `f` with exclusive access to the session.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::LockPoisoned`] if a previous holder panicked.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let mut guard = self.0.lock()?;
        Ok(f(&mut *guard))
    }

    /// Clone of the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::LockPoisoned`] if a previous holder panicked.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.with_mut(|s| s.get(key).cloned())
    }

    /// Deserialized value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::LockPoisoned`] if a previous holder panicked.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.with_mut(|s| s.get_as(key))
    }

    /// Store a value.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SessionUnavailable`] on the null session.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>> {
        self.with_mut(|s| s.insert(key, value))?
    }

    /// Remove a value.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SessionUnavailable`] on the null session.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        self.with_mut(|s| s.remove(key))?
    }

    /// Empty the session.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SessionUnavailable`] on the null session.
    pub fn clear(&self) -> Result<()> {
        self.with_mut(Session::clear)?
    }

    /// Set the permanent flag.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SessionUnavailable`] on the null session.
    pub fn set_permanent(&self, permanent: bool) -> Result<()> {
        self.with_mut(|s| s.set_permanent(permanent))?
    }

    /// Snapshot of the current session state.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::LockPoisoned`] if a previous holder panicked.
    pub fn snapshot(&self) -> Result<Session> {
        self.with(Clone::clone)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fresh_session_flags() {
        let session = Session::new();
        assert!(session.is_empty());
        assert!(!session.modified());
        assert!(!session.accessed());
        assert!(!session.permanent());
        assert!(!session.is_new());
    }

    #[test]
    fn test_read_sets_accessed_only() {
        let mut session = Session::from_data(Map::from_iter([("a".to_string(), json!(1))]));
        assert_eq!(session.get("a"), Some(&json!(1)));
        assert!(session.accessed());
        assert!(!session.modified());
    }

    #[test]
    fn test_contains_key_is_not_an_access() {
        let session = Session::from_data(Map::from_iter([("a".to_string(), json!(1))]));
        assert!(session.contains_key("a"));
        assert!(!session.accessed());
    }

    #[test]
    fn test_write_sets_both_flags() {
        let mut session = Session::new();
        session.insert("user_id", 42).unwrap();
        assert!(session.modified());
        assert!(session.accessed());
        assert_eq!(session.get_as::<u32>("user_id"), Some(42));
    }

    #[test]
    fn test_get_mut_marks_modified() {
        let mut session = Session::from_data(Map::from_iter([("cart".to_string(), json!([1]))]));
        if let Some(Value::Array(items)) = session.get_mut("cart").unwrap() {
            items.push(json!(2));
        }
        assert!(session.modified());
        assert_eq!(session.data()["cart"], json!([1, 2]));
    }

    #[test]
    fn test_get_or_insert() {
        let mut session = Session::new();
        assert_eq!(session.get_or_insert("n", 1).unwrap(), &json!(1));
        assert_eq!(session.get_or_insert("n", 2).unwrap(), &json!(1));
    }

    #[test]
    fn test_permanent_flag_travels_beside_data() {
        let mut session = Session::new();
        session.insert("k", "v").unwrap();
        session.set_permanent(true).unwrap();

        let payload = session.to_payload();
        assert_eq!(payload, json!({"d": {"k": "v"}, "p": true}));

        let loaded = Session::from_payload(payload).unwrap();
        assert!(loaded.permanent());
        assert_eq!(loaded.data(), &Map::from_iter([("k".to_string(), json!("v"))]));
        assert!(!loaded.modified());
    }

    #[test]
    fn test_user_keys_resembling_flags_are_kept() {
        let mut session = Session::new();
        session
            .extend([("_permanent", json!("yes")), ("p", json!(true)), ("k", json!(1))])
            .unwrap();

        let loaded = Session::from_payload(session.to_payload()).unwrap();
        assert!(!loaded.permanent());
        assert_eq!(loaded.data(), session.data());
    }

    #[test]
    fn test_from_payload_rejects_other_shapes() {
        assert!(Session::from_payload(json!({"k": 1})).is_none());
        assert!(Session::from_payload(json!({"d": [1]})).is_none());
        assert!(Session::from_payload(json!({"d": {}, "p": "yes"})).is_none());
        assert!(Session::from_payload(json!("d")).is_none());
        assert_eq!(Session::from_payload(json!({"d": {}})), Some(Session::new()));
    }

    #[test]
    fn test_from_data_keeps_every_key() {
        let session = Session::from_data(Map::from_iter([("_permanent".to_string(), json!(true))]));
        assert!(!session.permanent());
        assert!(session.contains_key("_permanent"));
    }

    #[test]
    fn test_permanent_empty_session_is_not_empty() {
        let mut session = Session::new();
        session.set_permanent(true).unwrap();
        assert!(!session.is_empty());
        session.clear().unwrap();
        assert!(session.is_empty());
        assert!(session.modified());
    }

    #[test]
    fn test_null_session_rejects_every_mutation() {
        let mut session = Session::null();
        assert!(session.is_null());
        assert_eq!(session.get("missing"), None);
        assert!(!session.permanent());

        assert_eq!(session.insert("k", 1), Err(ContextError::SessionUnavailable));
        assert_eq!(session.remove("k"), Err(ContextError::SessionUnavailable));
        assert_eq!(session.clear(), Err(ContextError::SessionUnavailable));
        assert_eq!(session.set_permanent(true), Err(ContextError::SessionUnavailable));
        assert!(session.get_mut("k").is_err());
        assert!(session.get_or_insert("k", 1).is_err());
        assert_eq!(
            session.extend([("k", 1)]),
            Err(ContextError::SessionUnavailable)
        );
        assert!(!session.modified());
    }

    #[test]
    fn test_handle_shares_state() {
        let handle = SessionHandle::new(Session::new());
        let other = handle.clone();
        handle.insert("x", "y").unwrap();
        assert_eq!(other.get("x").unwrap(), Some(json!("y")));
        assert!(other.snapshot().unwrap().modified());
    }
}
