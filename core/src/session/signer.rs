//! Timestamped HMAC signing of JSON payloads.
//!
//! Wire format (all segments unpadded URL-safe base64):
//!
//! ```text
//! <json payload> . <big-endian unix timestamp> . <HMAC-SHA256 signature>
//! ```
//!
//! The signing key is derived per call as `HMAC(secret, salt)` and the
//! signature covers `payload.timestamp`. Verification checks the signature
//! in constant time before looking at the timestamp or the payload.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SEPARATOR: char = '.';

/// Why a signed value was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The value is missing a separator or a segment is not valid base64.
    #[error("Malformed signed value: {0}")]
    Malformed(&'static str),

    /// The signature does not match the payload.
    #[error("Signature does not match")]
    BadSignature,

    /// The timestamp segment could not be decoded.
    #[error("Malformed timestamp")]
    BadTimestamp,

    /// The signature is valid but older than the allowed age, or from the future.
    #[error("Signature age {age}s outside 0..={max_age}s")]
    Expired {
        /// Age of the signature in seconds
        age: i64,
        /// Allowed age in seconds
        max_age: i64,
    },

    /// The signature is valid but the payload is not JSON.
    #[error("Could not decode payload: {0}")]
    BadPayload(String),

    /// The secret could not key the MAC.
    #[error("Invalid signing key")]
    InvalidKey,
}

/// Signs and verifies JSON values with a timestamp.
#[derive(Clone, Copy)]
pub struct TimedSerializer<'a> {
    secret: &'a [u8],
    salt: &'a [u8],
}

impl std::fmt::Debug for TimedSerializer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedSerializer")
            .field("salt", &String::from_utf8_lossy(self.salt))
            .finish_non_exhaustive()
    }
}

impl<'a> TimedSerializer<'a> {
    /// Create a serializer for `secret` namespaced by `salt`.
    #[must_use]
    pub const fn new(secret: &'a [u8], salt: &'a [u8]) -> Self {
        Self { secret, salt }
    }

    /// Serialize and sign `value` at time `now`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::BadPayload`] if `value` cannot be encoded.
    pub fn dumps(&self, value: &Value, now: DateTime<Utc>) -> Result<String, SignatureError> {
        let json = serde_json::to_vec(value).map_err(|e| SignatureError::BadPayload(e.to_string()))?;

        let mut signed = URL_SAFE_NO_PAD.encode(json);
        signed.push(SEPARATOR);
        signed.push_str(&URL_SAFE_NO_PAD.encode(timestamp_bytes(now.timestamp())));

        let signature = self.signature(signed.as_bytes())?;
        signed.push(SEPARATOR);
        signed.push_str(&URL_SAFE_NO_PAD.encode(signature));
        Ok(signed)
    }

    /// Verify `signed` and decode its payload.
    ///
    /// # Errors
    ///
    /// Returns the first check that failed: structure, signature, timestamp,
    /// age against `max_age`, then payload decoding.
    pub fn loads(
        &self,
        signed: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Value, SignatureError> {
        let (value, signature) = signed
            .rsplit_once(SEPARATOR)
            .ok_or(SignatureError::Malformed("no separator found"))?;

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SignatureError::Malformed("signature is not base64"))?;
        let expected = self.signature(value.as_bytes())?;
        if !constant_time_eq::constant_time_eq(&provided, &expected) {
            return Err(SignatureError::BadSignature);
        }

        let (payload, timestamp) = value
            .rsplit_once(SEPARATOR)
            .ok_or(SignatureError::BadTimestamp)?;
        let issued_at = URL_SAFE_NO_PAD
            .decode(timestamp)
            .ok()
            .and_then(|bytes| timestamp_from_bytes(&bytes))
            .ok_or(SignatureError::BadTimestamp)?;

        let age = now.timestamp().saturating_sub(issued_at);
        let max_age = max_age.num_seconds();
        if age > max_age || age < 0 {
            return Err(SignatureError::Expired { age, max_age });
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| SignatureError::BadPayload(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| SignatureError::BadPayload(e.to_string()))
    }

    fn derive_key(&self) -> Result<Vec<u8>, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret).map_err(|_| SignatureError::InvalidKey)?;
        mac.update(self.salt);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn signature(&self, value: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let key = self.derive_key()?;
        let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| SignatureError::InvalidKey)?;
        mac.update(value);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Big-endian bytes with leading zero bytes stripped.
fn timestamp_bytes(timestamp: i64) -> Vec<u8> {
    let bytes = u64::try_from(timestamp).unwrap_or(0).to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

fn timestamp_from_bytes(bytes: &[u8]) -> Option<i64> {
    if bytes.len() > 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    i64::try_from(u64::from_be_bytes(buf)).ok()
}
