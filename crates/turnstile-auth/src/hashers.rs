//! Password hashing.
//!
//! New passwords are hashed with Argon2id; bcrypt hashes are still
//! verifiable. All hashing and verification is async, delegating the
//! CPU-bound work to `tokio::task::spawn_blocking` to avoid blocking the
//! async runtime.
//!
//! # Hashers
//!
//! - [`Argon2Hasher`] - Primary hasher using Argon2id
//! - [`BcryptHasher`] - Verification of bcrypt hashes

use async_trait::async_trait;
use tokio::sync::OnceCell;
use turnstile_core::error::{TurnstileError, TurnstileResult};

/// Marker prefix for unusable passwords (accounts with no usable password).
const UNUSABLE_PASSWORD_PREFIX: &str = "!";

/// Password hashed once per process to give unknown-user logins the cost of
/// a real verification.
const DUMMY_PASSWORD: &str = "turnstile-timing-equalizer";

static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

/// Trait for password hashing backends.
///
/// Implementations must be `Send + Sync` for safe concurrent access.
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// Returns the algorithm identifier (e.g. "argon2", "bcrypt").
    fn algorithm(&self) -> &str;

    /// Hashes a password and returns the encoded hash string.
    async fn hash(&self, password: &str) -> TurnstileResult<String>;

    /// Verifies a password against an encoded hash.
    async fn verify(&self, password: &str, hash: &str) -> TurnstileResult<bool>;
}

/// Argon2id password hasher with the `argon2` crate's default parameters.
#[derive(Debug, Clone)]
pub struct Argon2Hasher;

#[async_trait]
impl PasswordHasher for Argon2Hasher {
    fn algorithm(&self) -> &'static str {
        "argon2"
    }

    async fn hash(&self, password: &str) -> TurnstileResult<String> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            use argon2::password_hash::{rand_core::OsRng, PasswordHasher as _, SaltString};
            use argon2::Argon2;

            let salt = SaltString::generate(&mut OsRng);
            let hash = Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map_err(|e| {
                    TurnstileError::InternalServerError(format!("Argon2 hash error: {e}"))
                })?;
            Ok(hash.to_string())
        })
        .await
        .map_err(|e| TurnstileError::InternalServerError(format!("Task join error: {e}")))?
    }

    async fn verify(&self, password: &str, hash: &str) -> TurnstileResult<bool> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || {
            use argon2::password_hash::{PasswordHash, PasswordVerifier};
            use argon2::Argon2;

            let parsed_hash = PasswordHash::new(&hash)
                .map_err(|e| TurnstileError::InternalServerError(format!("Invalid hash: {e}")))?;
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok())
        })
        .await
        .map_err(|e| TurnstileError::InternalServerError(format!("Task join error: {e}")))?
    }
}

/// Bcrypt password hasher.
#[derive(Debug, Clone)]
pub struct BcryptHasher {
    /// The bcrypt cost parameter (default: 12).
    pub cost: u32,
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self { cost: 12 }
    }
}

#[async_trait]
impl PasswordHasher for BcryptHasher {
    fn algorithm(&self) -> &'static str {
        "bcrypt"
    }

    async fn hash(&self, password: &str) -> TurnstileResult<String> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || {
            bcrypt::hash(password, cost).map_err(|e| {
                TurnstileError::InternalServerError(format!("Bcrypt hash error: {e}"))
            })
        })
        .await
        .map_err(|e| TurnstileError::InternalServerError(format!("Task join error: {e}")))?
    }

    async fn verify(&self, password: &str, hash: &str) -> TurnstileResult<bool> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || {
            bcrypt::verify(password, &hash).map_err(|e| {
                TurnstileError::InternalServerError(format!("Bcrypt verify error: {e}"))
            })
        })
        .await
        .map_err(|e| TurnstileError::InternalServerError(format!("Task join error: {e}")))?
    }
}

/// Identifies the hasher for a given encoded hash.
fn identify_hasher(encoded: &str) -> Option<Box<dyn PasswordHasher>> {
    if encoded.starts_with("$argon2") {
        Some(Box::new(Argon2Hasher))
    } else if encoded.starts_with("$2b$") || encoded.starts_with("$2a$") || encoded.starts_with("$2y$") {
        Some(Box::new(BcryptHasher::default()))
    } else {
        None
    }
}

/// Hashes a password with Argon2id.
pub async fn make_password(password: &str) -> TurnstileResult<String> {
    Argon2Hasher.hash(password).await
}

/// Checks a password against an encoded hash.
///
/// Identifies the hasher from the hash format. Returns `false` for unusable
/// hashes.
pub async fn check_password(password: &str, hash: &str) -> TurnstileResult<bool> {
    if !is_password_usable(hash) {
        return Ok(false);
    }

    let hasher = identify_hasher(hash).ok_or_else(|| {
        TurnstileError::InternalServerError(format!(
            "Unknown password hashing algorithm for hash: {}",
            hash.chars().take(20).collect::<String>()
        ))
    })?;

    tracing::trace!(algorithm = hasher.algorithm(), "Verifying password");
    hasher.verify(password, hash).await
}

/// Runs one password verification against a throwaway hash.
///
/// Called when a login names an unknown user so that the response takes as
/// long as a wrong password for an existing user. Always returns `false`.
pub async fn run_dummy_verification(password: &str) -> TurnstileResult<bool> {
    let hash = DUMMY_HASH
        .get_or_try_init(|| make_password(DUMMY_PASSWORD))
        .await?;
    check_password(password, hash).await?;
    Ok(false)
}

/// Returns `true` if the encoded hash represents a usable password.
///
/// Hashes prefixed with `!` (or empty) are unusable.
pub fn is_password_usable(hash: &str) -> bool {
    !hash.is_empty() && !hash.starts_with(UNUSABLE_PASSWORD_PREFIX)
}
