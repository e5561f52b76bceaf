//! The user record and the per-request authentication state.
//!
//! - [`User`] - A registered account as held by the credential store
//! - [`UserId`] - The store-assigned identifier of a user
//! - [`AuthState`] - Whether the current request is anonymous or authenticated
//!
//! Application-specific fields live in [`User::extra`] rather than in a
//! user subtype.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Number of leading password-hash characters stored in the session as a
/// fingerprint. Changing the password changes the fingerprint and thereby
/// invalidates existing sessions.
const SESSION_HASH_LENGTH: usize = 40;

/// Application-specific user fields.
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// The store-assigned identifier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered account.
///
/// The password field holds the encoded hash, never the raw password, and is
/// skipped when the user is serialized (e.g. into a template context).
#[derive(Clone, Serialize)]
pub struct User {
    /// The store-assigned identifier.
    pub id: UserId,
    /// The username, unique across all users (compared case-insensitively).
    pub username: String,
    /// The email address, with a lower-cased domain part.
    pub email: String,
    /// The encoded password hash. May be unusable (prefixed with `!`).
    #[serde(skip_serializing)]
    pub password: String,
    /// Whether this account may log in.
    pub is_active: bool,
    /// When the account was created.
    pub date_joined: DateTime<Utc>,
    /// Application-specific fields.
    pub extra: Extra,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("is_active", &self.is_active)
            .field("date_joined", &self.date_joined)
            .field("extra", &self.extra)
            .finish_non_exhaustive()
    }
}

impl User {
    /// Returns the fingerprint of the password hash stored in sessions.
    pub fn session_auth_hash(&self) -> String {
        self.password.chars().take(SESSION_HASH_LENGTH).collect()
    }
}

/// The authentication state of a request.
#[derive(Debug, Clone, Default)]
pub enum AuthState {
    /// No valid session was presented.
    #[default]
    Anonymous,
    /// A valid session for an active user was presented.
    Authenticated(User),
}

impl AuthState {
    /// Returns `true` for [`AuthState::Authenticated`].
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Returns the authenticated user, if any.
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }
}

/// Normalizes an email address by lower-casing its domain part.
///
/// The local part is left untouched since it may be case-sensitive. Input
/// without an `@` is returned trimmed but otherwise unchanged.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Folds a username for case-insensitive uniqueness comparisons.
pub fn username_key(username: &str) -> String {
    username.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(password: &str) -> User {
        User {
            id: UserId(7),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: password.to_string(),
            is_active: true,
            date_joined: Utc::now(),
            extra: Extra::new(),
        }
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("Alice@EXAMPLE.com"), "Alice@example.com");
        assert_eq!(normalize_email("  bob@Example.org "), "bob@example.org");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_username_key_folds_case() {
        assert_eq!(username_key("Alice"), username_key("aLICE"));
    }

    #[test]
    fn test_session_auth_hash_is_prefix() {
        let hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHRzYWx0$aGFzaGhhc2hoYXNo";
        let user = sample_user(hash);
        assert_eq!(user.session_auth_hash(), &hash[..40]);
        assert_eq!(sample_user("short").session_auth_hash(), "short");
    }

    #[test]
    fn test_user_serialization_omits_password() {
        let user = sample_user("$argon2id$secret");
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["id"], 7);
        assert!(json.get("password").is_none());
        assert!(!format!("{user:?}").contains("$argon2id$secret"));
    }

    #[test]
    fn test_auth_state() {
        assert!(!AuthState::default().is_authenticated());
        assert!(AuthState::Anonymous.user().is_none());
        let state = AuthState::Authenticated(sample_user("x"));
        assert!(state.is_authenticated());
        assert_eq!(state.user().map(|u| u.username.as_str()), Some("alice"));
    }
}
