//! HMAC-SHA256 Request Signing
//!
//! Signs `"{subject_id}:{timestamp}"` with the shared secret and returns the
//! lowercase hex digest the receiving service recomputes.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{Result, SigningError};

type HmacSha256 = Hmac<Sha256>;

/// Shared signing secret.
///
/// Never empty. The key material is zeroized on drop and redacted from `Debug`.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wrap a secret, rejecting empty or whitespace-only values.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = Zeroizing::new(value.into());
        if value.trim().is_empty() {
            return Err(SigningError::EmptySecret);
        }
        Ok(Self(value))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Hex-encoded HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// First 16 hex chars, for log lines.
    pub fn preview(&self) -> String {
        let head: String = self.0.chars().take(16).collect();
        format!("{head}...")
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Signature {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The exact byte string covered by the signature.
pub fn signing_message(subject_id: &str, timestamp: i64) -> String {
    format!("{subject_id}:{timestamp}")
}

fn mac_for(secret: &Secret, subject_id: &str, timestamp: i64) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signing_message(subject_id, timestamp).as_bytes());
    mac
}

/// Sign a subject/timestamp pair with HMAC-SHA256.
pub fn sign(secret: &Secret, subject_id: &str, timestamp: i64) -> Signature {
    let mac = mac_for(secret, subject_id, timestamp);
    Signature(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex signature for a subject/timestamp pair.
///
/// Comparison runs in constant time. Malformed hex never verifies.
pub fn verify(secret: &Secret, subject_id: &str, timestamp: i64, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    mac_for(secret, subject_id, timestamp)
        .verify_slice(&expected)
        .is_ok()
}
