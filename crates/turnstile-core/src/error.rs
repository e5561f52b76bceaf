//! Core error types for turnstile.
//!
//! [`TurnstileError`] covers every failure a request can run into: form
//! validation, duplicate usernames, failed logins, anonymous access to
//! protected pages, CSRF rejections and infrastructure errors. Form validation
//! failures carry a [`FieldErrors`] map so the originating form can be
//! re-rendered next to the offending inputs.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Key under which errors that do not belong to a single field are stored.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Field-level validation messages, keyed by form field name.
///
/// Ordered by field name so that rendering and `Display` output are stable.
///
/// # Examples
///
/// ```
/// use turnstile_core::error::FieldErrors;
///
/// let mut errors = FieldErrors::new();
/// errors.add("email", "Enter a valid email address.");
/// assert!(errors.contains("email"));
/// assert_eq!(errors.get("email"), ["Enter a valid email address."]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    /// Creates an empty error map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an error map holding a single message for `field`.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Appends a message to the given field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Appends a message that is not tied to a particular field.
    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.add(NON_FIELD_ERRORS, message);
    }

    /// Merges every message of `other` into this map.
    pub fn extend(&mut self, other: Self) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
    }

    /// Returns the messages recorded for `field` (empty if none).
    pub fn get(&self, field: &str) -> &[String] {
        self.errors.get(field).map_or(&[], Vec::as_slice)
    }

    /// Returns the messages not tied to a particular field.
    pub fn non_field_errors(&self) -> &[String] {
        self.get(NON_FIELD_ERRORS)
    }

    /// Returns `true` if at least one message is recorded for `field`.
    pub fn contains(&self, field: &str) -> bool {
        self.errors.get(field).is_some_and(|m| !m.is_empty())
    }

    /// Returns `true` if no messages are recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.values().all(Vec::is_empty)
    }

    /// Returns the number of fields that carry at least one message.
    pub fn len(&self) -> usize {
        self.errors.values().filter(|m| !m.is_empty()).count()
    }

    /// Iterates over `(field, messages)` pairs in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.errors
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    /// Returns `Ok(())` when empty, otherwise the map wrapped in
    /// [`TurnstileError::Validation`].
    pub fn into_result(self) -> TurnstileResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(TurnstileError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in self.iter() {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

/// The primary error type for turnstile.
///
/// Each variant maps to an HTTP status code via [`TurnstileError::status_code`].
/// The web layer decides how a variant is surfaced: validation and credential
/// failures re-render the originating form, `LoginRequired` becomes a redirect
/// to the login page, everything else an error page.
#[derive(Error, Debug)]
pub enum TurnstileError {
    // ── Request errors ───────────────────────────────────────────────

    /// One or more form fields failed validation.
    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    /// A uniqueness constraint (the username) was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The supplied username/password pair did not identify an active user.
    ///
    /// Deliberately carries no detail: unknown usernames, wrong passwords and
    /// inactive accounts are indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// An anonymous request targeted a protected page.
    #[error("Login required")]
    LoginRequired,

    /// The CSRF token was missing or did not match the cookie.
    #[error("CSRF verification failed: {0}")]
    CsrfFailure(String),

    /// HTTP 404 Not Found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP 405 Method Not Allowed.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    // ── Infrastructure ───────────────────────────────────────────────

    /// A storage operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A template failed to parse or render.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// HTTP 500 Internal Server Error.
    #[error("Internal server error: {0}")]
    InternalServerError(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TurnstileError {
    /// Returns the HTTP status code associated with this error.
    ///
    /// - `Validation` -> 400
    /// - `InvalidCredentials`, `LoginRequired` -> 401
    /// - `CsrfFailure` -> 403
    /// - `NotFound` -> 404
    /// - `MethodNotAllowed` -> 405
    /// - `Conflict` -> 409
    /// - Everything else -> 500
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::InvalidCredentials | Self::LoginRequired => 401,
            Self::CsrfFailure(_) => 403,
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::Conflict(_) => 409,
            Self::DatabaseError(_)
            | Self::ConfigurationError(_)
            | Self::TemplateError(_)
            | Self::InternalServerError(_)
            | Self::Io(_) => 500,
        }
    }

    /// Returns `true` for errors caused by the request rather than the server.
    pub const fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

/// A convenience type alias for `Result<T, TurnstileError>`.
pub type TurnstileResult<T> = Result<T, TurnstileError>;
