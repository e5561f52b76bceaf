//! System checks for a turnstile deployment.
//!
//! Checks inspect [`Settings`] before the server starts and report
//! misconfigurations as [`CheckMessage`]s. The `check` command prints them and
//! fails when any message is an error.
//!
//! ## Overview
//!
//! - [`CheckMessage`]: A diagnostic message from a check (with level, message, hint, etc.).
//! - [`CheckLevel`]: Severity level (Info, Warning, Error).
//! - [`CheckRegistry`]: Registry for check functions with tag-based filtering.
//!
//! ## Examples
//!
//! ```
//! use turnstile_core::checks::{CheckMessage, CheckRegistry};
//!
//! let mut registry = CheckRegistry::new();
//! registry.register(
//!     |_settings| {
//!         vec![CheckMessage::warning(
//!             "Custom check warning",
//!             Some("Consider fixing this."),
//!             None,
//!             Some("myapp.W001"),
//!         )]
//!     },
//!     &["myapp"],
//! );
//!
//! let settings = turnstile_core::settings::Settings::default();
//! let messages = registry.run_checks(None, &settings);
//! assert!(!messages.is_empty());
//! ```

use crate::settings::Settings;

/// Minimum secret key length that does not trigger a warning.
const MIN_SECRET_KEY_LENGTH: usize = 50;

/// Minimum password length below which the policy is reported as weak.
const MIN_RECOMMENDED_PASSWORD_LENGTH: usize = 8;

/// Severity level for a check message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckLevel {
    /// Informational message.
    Info,
    /// A potential problem.
    Warning,
    /// A problem that must be fixed before serving.
    Error,
}

impl std::fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A diagnostic message produced by a system check.
#[derive(Debug, Clone)]
pub struct CheckMessage {
    /// The severity level.
    pub level: CheckLevel,
    /// The human-readable message describing the issue.
    pub msg: String,
    /// An optional hint on how to fix the issue.
    pub hint: Option<String>,
    /// The setting that the issue relates to.
    pub obj: Option<String>,
    /// A unique identifier for this check message (e.g. "security.W001").
    pub id: Option<String>,
}

impl CheckMessage {
    /// Creates a new `CheckMessage` with the given level and details.
    pub fn new(
        level: CheckLevel,
        msg: impl Into<String>,
        hint: Option<&str>,
        obj: Option<&str>,
        id: Option<&str>,
    ) -> Self {
        Self {
            level,
            msg: msg.into(),
            hint: hint.map(String::from),
            obj: obj.map(String::from),
            id: id.map(String::from),
        }
    }

    /// Creates an info-level message.
    pub fn info(msg: impl Into<String>, hint: Option<&str>, obj: Option<&str>, id: Option<&str>) -> Self {
        Self::new(CheckLevel::Info, msg, hint, obj, id)
    }

    /// Creates a warning-level message.
    pub fn warning(msg: impl Into<String>, hint: Option<&str>, obj: Option<&str>, id: Option<&str>) -> Self {
        Self::new(CheckLevel::Warning, msg, hint, obj, id)
    }

    /// Creates an error-level message.
    pub fn error(msg: impl Into<String>, hint: Option<&str>, obj: Option<&str>, id: Option<&str>) -> Self {
        Self::new(CheckLevel::Error, msg, hint, obj, id)
    }

    /// Returns `true` if this is a warning or higher severity.
    pub fn is_serious(&self) -> bool {
        self.level >= CheckLevel::Warning
    }

    /// Returns `true` if this message should stop the server from starting.
    pub fn is_error(&self) -> bool {
        self.level >= CheckLevel::Error
    }
}

impl std::fmt::Display for CheckMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.id {
            write!(f, "({id}) ")?;
        }
        write!(f, "{}: {}", self.level, self.msg)?;
        if let Some(ref hint) = self.hint {
            write!(f, "\n\tHINT: {hint}")?;
        }
        if let Some(ref obj) = self.obj {
            write!(f, "\n\tObject: {obj}")?;
        }
        Ok(())
    }
}

/// A check function that receives settings and returns diagnostic messages.
pub type CheckFn = fn(&Settings) -> Vec<CheckMessage>;

/// A registered check with associated tags.
struct RegisteredCheck {
    func: CheckFn,
    tags: Vec<String>,
}

/// Registry for system check functions.
///
/// Check functions can be registered with tags, and then run all at once
/// or filtered by tag.
pub struct CheckRegistry {
    checks: Vec<RegisteredCheck>,
}

impl CheckRegistry {
    /// Creates a new empty check registry.
    pub const fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Creates a new check registry pre-loaded with built-in checks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(check_secret_key, &["security"]);
        registry.register(check_debug, &["security"]);
        registry.register(check_session_cookie_secure, &["security"]);
        registry.register(check_database_engine, &["database"]);
        registry.register(check_password_policy, &["auth"]);
        registry
    }

    /// Registers a check function with the given tags.
    pub fn register(&mut self, func: CheckFn, tags: &[&str]) {
        self.checks.push(RegisteredCheck {
            func,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        });
    }

    /// Runs all registered checks (or only those matching the given tags)
    /// and collects all resulting messages.
    ///
    /// If `tags` is `None`, all checks are run. If `Some(&["security"])`,
    /// only checks tagged with "security" are run.
    pub fn run_checks(&self, tags: Option<&[&str]>, settings: &Settings) -> Vec<CheckMessage> {
        let mut messages = Vec::new();

        for check in &self.checks {
            let should_run = tags.map_or(true, |filter_tags| {
                filter_tags.iter().any(|t| check.tags.iter().any(|c| c == t))
            });

            if should_run {
                messages.extend((check.func)(settings));
            }
        }

        messages
    }

    /// Returns the number of registered checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Returns `true` if no checks are registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Built-in checks
// ============================================================

/// Checks that the secret key is set and long enough.
///
/// An empty key is only an error outside debug mode, where the server
/// refuses to start without one.
fn check_secret_key(settings: &Settings) -> Vec<CheckMessage> {
    let mut messages = Vec::new();

    if settings.secret_key.is_empty() {
        if settings.debug {
            messages.push(CheckMessage::warning(
                "secret_key is empty; a random key is generated per process and sessions will not survive a restart.",
                Some("Set a strong, unique secret_key in your settings."),
                Some("settings.secret_key"),
                Some("security.W001"),
            ));
        } else {
            messages.push(CheckMessage::error(
                "secret_key is empty with debug disabled.",
                Some("Set secret_key or TURNSTILE_SECRET_KEY."),
                Some("settings.secret_key"),
                Some("security.E001"),
            ));
        }
    } else if settings.secret_key.len() < MIN_SECRET_KEY_LENGTH {
        messages.push(CheckMessage::warning(
            format!("secret_key is too short. Use at least {MIN_SECRET_KEY_LENGTH} characters."),
            Some("Generate a longer secret_key for better security."),
            Some("settings.secret_key"),
            Some("security.W002"),
        ));
    }

    messages
}

/// Reports that debug mode is on.
fn check_debug(settings: &Settings) -> Vec<CheckMessage> {
    if settings.debug {
        vec![CheckMessage::warning(
            "debug is enabled. Do not run with debug enabled in production.",
            Some("Set debug = false (or TURNSTILE_DEBUG=false) for deployments."),
            Some("settings.debug"),
            Some("security.W003"),
        )]
    } else {
        Vec::new()
    }
}

/// Checks that the session cookie is marked `Secure` outside debug mode.
fn check_session_cookie_secure(settings: &Settings) -> Vec<CheckMessage> {
    if !settings.debug && !settings.session_cookie_secure {
        vec![CheckMessage::warning(
            "session_cookie_secure is false; session cookies may be sent over plain HTTP.",
            Some("Set session_cookie_secure = true when serving over HTTPS."),
            Some("settings.session_cookie_secure"),
            Some("security.W004"),
        )]
    } else {
        Vec::new()
    }
}

/// Checks that the configured storage engine is one the server can open.
fn check_database_engine(settings: &Settings) -> Vec<CheckMessage> {
    match settings.database.engine.as_str() {
        "sqlite" => Vec::new(),
        "memory" => vec![CheckMessage::info(
            "The memory engine keeps no accounts across restarts.",
            Some("Use engine = \"sqlite\" to persist accounts."),
            Some("settings.database.engine"),
            Some("database.I001"),
        )],
        other => vec![CheckMessage::error(
            format!("Unknown database engine '{other}'."),
            Some("Use \"memory\" or \"sqlite\"."),
            Some("settings.database.engine"),
            Some("database.E001"),
        )],
    }
}

/// Checks that the minimum password length is not weaker than the default.
fn check_password_policy(settings: &Settings) -> Vec<CheckMessage> {
    if settings.password_validation.min_length < MIN_RECOMMENDED_PASSWORD_LENGTH {
        vec![CheckMessage::warning(
            format!(
                "password_validation.min_length is {}; passwords shorter than {MIN_RECOMMENDED_PASSWORD_LENGTH} characters are easy to guess.",
                settings.password_validation.min_length
            ),
            None,
            Some("settings.password_validation.min_length"),
            Some("auth.W001"),
        )]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(messages: &[CheckMessage]) -> Vec<&str> {
        messages.iter().filter_map(|m| m.id.as_deref()).collect()
    }

    fn production_settings() -> Settings {
        let mut s = Settings::default();
        s.debug = false;
        s.secret_key = "k".repeat(64);
        s.session_cookie_secure = true;
        s.database.engine = "sqlite".to_string();
        s
    }

    // ── CheckLevel / CheckMessage ───────────────────────────────────

    #[test]
    fn test_check_level_ordering() {
        assert!(CheckLevel::Info < CheckLevel::Warning);
        assert!(CheckLevel::Warning < CheckLevel::Error);
    }

    #[test]
    fn test_check_message_display() {
        let m = CheckMessage::error("broken", Some("fix it"), Some("settings.x"), Some("x.E001"));
        let s = m.to_string();
        assert!(s.starts_with("(x.E001) ERROR: broken"));
        assert!(s.contains("HINT: fix it"));
        assert!(s.contains("Object: settings.x"));
        assert!(m.is_serious());
        assert!(m.is_error());
        assert!(!CheckMessage::info("fyi", None, None, None).is_serious());
    }

    // ── Registry ────────────────────────────────────────────────────

    #[test]
    fn test_registry_tag_filtering() {
        let registry = CheckRegistry::with_builtins();
        assert_eq!(registry.len(), 5);

        let mut settings = production_settings();
        settings.password_validation.min_length = 4;
        settings.database.engine = "postgres".to_string();

        let auth_only = registry.run_checks(Some(&["auth"]), &settings);
        assert_eq!(ids(&auth_only), ["auth.W001"]);

        let all = registry.run_checks(None, &settings);
        assert_eq!(ids(&all), ["database.E001", "auth.W001"]);
    }

    #[test]
    fn test_empty_registry() {
        let registry = CheckRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.run_checks(None, &Settings::default()).is_empty());
    }

    // ── Built-in checks ─────────────────────────────────────────────

    #[test]
    fn test_production_settings_pass() {
        let messages = CheckRegistry::with_builtins().run_checks(None, &production_settings());
        assert!(messages.is_empty(), "unexpected: {messages:?}");
    }

    #[test]
    fn test_default_settings_only_warn() {
        let messages = CheckRegistry::with_builtins().run_checks(None, &Settings::default());
        assert_eq!(ids(&messages), ["security.W001", "security.W003", "database.I001"]);
        assert!(messages.iter().all(|m| !m.is_error()));
        assert!(!messages[2].is_serious());
    }

    #[test]
    fn test_empty_secret_key_is_error_outside_debug() {
        let mut settings = production_settings();
        settings.secret_key = String::new();
        let messages = check_secret_key(&settings);
        assert_eq!(ids(&messages), ["security.E001"]);
        assert!(messages[0].is_error());
    }

    #[test]
    fn test_short_secret_key() {
        let mut settings = production_settings();
        settings.secret_key = "short".to_string();
        assert_eq!(ids(&check_secret_key(&settings)), ["security.W002"]);
    }

    #[test]
    fn test_insecure_session_cookie_outside_debug() {
        let mut settings = production_settings();
        settings.session_cookie_secure = false;
        assert_eq!(ids(&check_session_cookie_secure(&settings)), ["security.W004"]);

        settings.debug = true;
        assert!(check_session_cookie_secure(&settings).is_empty());
    }
}
