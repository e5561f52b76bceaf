//! Application settings.
//!
//! [`Settings`] holds every configurable value of a turnstile deployment with
//! sensible defaults. Settings are loaded once at startup (see
//! [`settings_loader`](crate::settings_loader)) and then passed explicitly to
//! the components that need them; there is no global settings instance.

use std::path::PathBuf;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{TurnstileError, TurnstileResult};

/// Length of the secret key generated for debug runs without a configured key.
const GENERATED_SECRET_KEY_LENGTH: usize = 50;

/// Credential storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The storage engine: `"memory"` or `"sqlite"`.
    pub engine: String,
    /// The database file path (ignored by the in-memory engine).
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "memory".to_string(),
            name: "turnstile.sqlite3".to_string(),
        }
    }
}

/// Password policy applied to new passwords at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordValidationSettings {
    /// Minimum number of characters.
    pub min_length: usize,
    /// Reject passwords found in the common-password list.
    pub reject_common: bool,
    /// Reject passwords made up entirely of digits.
    pub reject_numeric: bool,
    /// Reject passwords too similar to the username or email.
    pub reject_similar: bool,
}

impl Default for PasswordValidationSettings {
    fn default() -> Self {
        Self {
            min_length: 8,
            reject_common: true,
            reject_numeric: true,
            reject_similar: true,
        }
    }
}

/// The complete set of application settings.
///
/// # Examples
///
/// ```
/// use turnstile_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.login_url, "/login");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled.
    pub debug: bool,
    /// The secret key used for signing session cookies.
    pub secret_key: String,
    /// Retired secret keys still accepted when verifying session cookies.
    pub secret_key_fallbacks: Vec<String>,
    /// Address the server binds to.
    pub host: String,
    /// Port the server listens on.
    pub port: u16,

    // ── Database ─────────────────────────────────────────────────────

    /// Credential store configuration.
    pub database: DatabaseSettings,

    // ── Sessions ─────────────────────────────────────────────────────

    /// The name of the session cookie.
    pub session_cookie_name: String,
    /// The session lifetime in seconds.
    pub session_cookie_age: u64,
    /// Whether the session cookie carries the `Secure` attribute.
    pub session_cookie_secure: bool,
    /// The `SameSite` attribute of the session cookie.
    pub session_cookie_samesite: String,

    // ── Security ─────────────────────────────────────────────────────

    /// The name of the CSRF cookie.
    pub csrf_cookie_name: String,

    // ── Auth ─────────────────────────────────────────────────────────

    /// Where anonymous visitors of protected pages are sent.
    pub login_url: String,
    /// Where a successful login lands when no `next` is given.
    pub login_redirect_url: String,
    /// Where logout lands.
    pub logout_redirect_url: String,
    /// The password policy.
    pub password_validation: PasswordValidationSettings,

    // ── Templates ────────────────────────────────────────────────────

    /// Directory whose templates override the built-in ones by name.
    pub templates_dir: Option<PathBuf>,

    // ── Logging ──────────────────────────────────────────────────────

    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Core
            debug: true,
            secret_key: String::new(),
            secret_key_fallbacks: Vec::new(),
            host: "127.0.0.1".to_string(),
            port: 8000,

            // Database
            database: DatabaseSettings::default(),

            // Sessions
            session_cookie_name: "sessionid".to_string(),
            session_cookie_age: 1_209_600, // 2 weeks
            session_cookie_secure: false,
            session_cookie_samesite: "Lax".to_string(),

            // Security
            csrf_cookie_name: "csrftoken".to_string(),

            // Auth
            login_url: "/login".to_string(),
            login_redirect_url: "/dashboard".to_string(),
            logout_redirect_url: "/login".to_string(),
            password_validation: PasswordValidationSettings::default(),

            // Templates
            templates_dir: None,

            // Logging
            log_level: "info".to_string(),

            // Extra
        }
    }
}

impl Settings {
    /// Returns the `host:port` address the server should bind to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Makes sure a signing key is available.
    ///
    /// In debug mode an empty key is replaced with a random key that lives
    /// only as long as the process; sessions do not survive a restart. Outside
    /// debug mode an empty key is a configuration error.
    pub fn ensure_secret_key(&mut self) -> TurnstileResult<()> {
        if !self.secret_key.is_empty() {
            return Ok(());
        }
        if !self.debug {
            return Err(TurnstileError::ConfigurationError(
                "secret_key must be set when debug is disabled".to_string(),
            ));
        }
        tracing::warn!("No secret_key configured; using a random per-process key");
        self.secret_key = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_SECRET_KEY_LENGTH)
            .map(char::from)
            .collect();
        Ok(())
    }
}
