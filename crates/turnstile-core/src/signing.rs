//! Cryptographic signing of cookie values.
//!
//! [`Signer`] appends an HMAC-SHA256 signature to a string so that a value
//! handed to the client (the session key) can be verified when it comes back.
//! Tampered values fail verification and are treated as absent by callers.
//!
//! ## Key Rotation
//!
//! [`Signer`] supports `fallback_keys`. When verifying, the primary key is
//! tried first, then each fallback key in order.

use std::fmt::Write as _;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// The separator used between value and signature.
const DEFAULT_SEP: &str = ":";

/// The default HMAC salt.
const DEFAULT_SALT: &str = "turnstile.signing.Signer";

/// Why a signed value was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BadSignature {
    /// The value carries no separator, so no signature either.
    #[error("No separator found in signed value")]
    MissingSeparator,
    /// The signature does not match any configured key.
    #[error("Signature verification failed")]
    Mismatch,
}

// ============================================================
// Signer
// ============================================================

/// Signs and verifies strings using HMAC-SHA256.
///
/// # Examples
///
/// ```
/// use turnstile_core::signing::Signer;
///
/// let signer = Signer::new("my-secret-key");
/// let signed = signer.sign("hello");
/// assert_eq!(signer.unsign(&signed).unwrap(), "hello");
/// ```
#[derive(Clone)]
pub struct Signer {
    key: String,
    fallback_keys: Vec<String>,
    sep: String,
    salt: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("salt", &self.salt)
            .field("fallback_keys", &self.fallback_keys.len())
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Creates a new `Signer` with the given secret key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fallback_keys: Vec::new(),
            sep: DEFAULT_SEP.to_string(),
            salt: DEFAULT_SALT.to_string(),
        }
    }

    /// Sets fallback keys for key rotation.
    #[must_use]
    pub fn with_fallback_keys(mut self, keys: Vec<String>) -> Self {
        self.fallback_keys = keys;
        self
    }

    /// Sets the salt for the HMAC.
    ///
    /// Signers with different salts never accept each other's values.
    #[must_use]
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    /// Computes the HMAC-SHA256 signature for a value using the given key.
    fn make_signature(&self, value: &str, key: &str) -> String {
        let salted_key = format!("{}:{}", self.salt, key);
        let mut mac =
            HmacSha256::new_from_slice(salted_key.as_bytes()).expect("HMAC accepts any key size");
        mac.update(value.as_bytes());
        let result = mac.finalize().into_bytes();
        URL_SAFE_NO_PAD.encode(result)
    }

    /// Signs a value, returning `"value:signature"`.
    pub fn sign(&self, value: &str) -> String {
        let sig = self.make_signature(value, &self.key);
        format!("{}{}{}", value, self.sep, sig)
    }

    /// Verifies and returns the original value from a signed string.
    ///
    /// Tries the primary key first, then each fallback key.
    pub fn unsign(&self, signed_value: &str) -> Result<String, BadSignature> {
        let (value, sig) = signed_value
            .rsplit_once(&self.sep)
            .ok_or(BadSignature::MissingSeparator)?;

        let expected = self.make_signature(value, &self.key);
        if constant_time_eq(sig.as_bytes(), expected.as_bytes()) {
            return Ok(value.to_string());
        }

        for fallback in &self.fallback_keys {
            let expected = self.make_signature(value, fallback);
            if constant_time_eq(sig.as_bytes(), expected.as_bytes()) {
                return Ok(value.to_string());
            }
        }

        Err(BadSignature::Mismatch)
    }
}

// ============================================================
// Helpers
// ============================================================

/// Constant-time byte comparison to prevent timing attacks.
///
/// Inputs of different lengths compare unequal immediately; only the length
/// leaks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Returns `n_bytes` of OS-seeded randomness, hex-encoded.
///
/// Used for session keys and CSRF tokens.
pub fn random_hex_token(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
        .iter()
        .fold(String::with_capacity(n_bytes * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
}
