//! The credential store.
//!
//! [`CredentialStore`] is the persistence seam for user records. Two
//! implementations ship with turnstile:
//!
//! - [`InMemoryCredentialStore`] - A map behind an async `RwLock`, for tests and demos
//! - [`SqliteCredentialStore`](crate::sqlite::SqliteCredentialStore) - A `rusqlite` table
//!
//! Usernames are unique case-insensitively: once `alice` exists, `Alice`
//! cannot register. Lookups by username are exact.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use turnstile_core::error::{TurnstileError, TurnstileResult};

use crate::hashers;
use crate::user::{normalize_email, username_key, Extra, User, UserId};

/// Storage for user records.
///
/// Implementations must be `Send + Sync` and enforce username uniqueness
/// atomically: of two concurrent `create_user` calls for the same username,
/// exactly one succeeds and the other receives [`TurnstileError::Conflict`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Creates a user, hashing the raw password with Argon2id.
    ///
    /// Fails with [`TurnstileError::Conflict`] if the username is taken.
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        extra: Extra,
    ) -> TurnstileResult<UserId>;

    /// Returns the user with exactly this username.
    async fn get_by_username(&self, username: &str) -> TurnstileResult<Option<User>>;

    /// Returns the user with this id.
    async fn get_by_id(&self, id: UserId) -> TurnstileResult<Option<User>>;

    /// Returns `true` if a user with this username exists, ignoring case.
    async fn username_taken(&self, username: &str) -> TurnstileResult<bool>;

    /// Returns the number of stored users.
    async fn count(&self) -> TurnstileResult<usize>;

    /// Activates or deactivates an account. Inactive accounts cannot log in
    /// and their sessions stop resolving.
    async fn set_active(&self, id: UserId, is_active: bool) -> TurnstileResult<()>;

    /// Checks a raw password against the stored hash of `username`.
    ///
    /// Unknown usernames cost one dummy hash verification and return `false`.
    /// Has no side effects.
    async fn verify_password(&self, username: &str, password: &str) -> TurnstileResult<bool> {
        match self.get_by_username(username).await? {
            Some(user) => hashers::check_password(password, &user.password).await,
            None => hashers::run_dummy_verification(password).await,
        }
    }
}

#[derive(Debug, Default)]
struct Users {
    by_id: HashMap<UserId, User>,
    by_key: HashMap<String, UserId>,
    next_id: i64,
}

/// An in-memory credential store.
///
/// Records are lost when the process exits. Cloning shares the underlying
/// map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    users: Arc<RwLock<Users>>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        extra: Extra,
    ) -> TurnstileResult<UserId> {
        let key = username_key(username);
        if self.users.read().await.by_key.contains_key(&key) {
            return Err(conflict(username));
        }

        // Hash outside the lock; the check below is the one that counts.
        let password = hashers::make_password(password).await?;

        let mut users = self.users.write().await;
        if users.by_key.contains_key(&key) {
            return Err(conflict(username));
        }
        users.next_id += 1;
        let id = UserId(users.next_id);
        users.by_key.insert(key, id);
        users.by_id.insert(
            id,
            User {
                id,
                username: username.to_string(),
                email: normalize_email(email),
                password,
                is_active: true,
                date_joined: Utc::now(),
                extra,
            },
        );
        drop(users);

        tracing::debug!(user_id = %id, username, "Stored new user");
        Ok(id)
    }

    async fn get_by_username(&self, username: &str) -> TurnstileResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .by_key
            .get(&username_key(username))
            .and_then(|id| users.by_id.get(id))
            .filter(|user| user.username == username)
            .cloned())
    }

    async fn get_by_id(&self, id: UserId) -> TurnstileResult<Option<User>> {
        Ok(self.users.read().await.by_id.get(&id).cloned())
    }

    async fn username_taken(&self, username: &str) -> TurnstileResult<bool> {
        Ok(self
            .users
            .read()
            .await
            .by_key
            .contains_key(&username_key(username)))
    }

    async fn count(&self) -> TurnstileResult<usize> {
        Ok(self.users.read().await.by_id.len())
    }

    async fn set_active(&self, id: UserId, is_active: bool) -> TurnstileResult<()> {
        let mut users = self.users.write().await;
        let user = users
            .by_id
            .get_mut(&id)
            .ok_or_else(|| TurnstileError::NotFound(format!("User {id} not found")))?;
        user.is_active = is_active;
        Ok(())
    }
}

pub(crate) fn conflict(username: &str) -> TurnstileError {
    TurnstileError::Conflict(format!("A user named '{username}' already exists"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let store = InMemoryCredentialStore::new();
        let id = store
            .create_user("alice", "alice@EXAMPLE.com", "Secret123", Extra::new())
            .await
            .unwrap();

        let user = store.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email, "alice@example.com");
        assert!(user.is_active);
        assert!(user.password.starts_with("$argon2id$"));
        assert_ne!(user.password, "Secret123");

        let by_id = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts_ignoring_case() {
        let store = InMemoryCredentialStore::new();
        store
            .create_user("alice", "a@example.com", "Secret123", Extra::new())
            .await
            .unwrap();

        let err = store
            .create_user("Alice", "b@example.com", "Other456", Extra::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnstileError::Conflict(_)));
        assert!(store.username_taken("ALICE").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);

        // The existing account is untouched.
        let original = store.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(original.email, "a@example.com");
        assert!(store.verify_password("alice", "Secret123").await.unwrap());
        assert!(!store.verify_password("alice", "Other456").await.unwrap());
    }

    #[tokio::test]
    async fn test_lookup_is_exact() {
        let store = InMemoryCredentialStore::new();
        store
            .create_user("alice", "a@example.com", "Secret123", Extra::new())
            .await
            .unwrap();
        assert!(store.get_by_username("Alice").await.unwrap().is_none());
        assert!(!store.verify_password("Alice", "Secret123").await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_password() {
        let store = InMemoryCredentialStore::new();
        store
            .create_user("alice", "a@example.com", "Secret123", Extra::new())
            .await
            .unwrap();
        assert!(store.verify_password("alice", "Secret123").await.unwrap());
        assert!(!store.verify_password("alice", "wrong").await.unwrap());
        assert!(!store.verify_password("nobody", "Secret123").await.unwrap());
    }

    #[tokio::test]
    async fn test_extra_fields_are_kept() {
        let store = InMemoryCredentialStore::new();
        let mut extra = Extra::new();
        extra.insert("favorite_color".to_string(), serde_json::json!("teal"));
        let id = store
            .create_user("carol", "c@example.com", "Secret123", extra)
            .await
            .unwrap();
        let user = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.extra["favorite_color"], "teal");
    }

    #[tokio::test]
    async fn test_set_active() {
        let store = InMemoryCredentialStore::new();
        let id = store
            .create_user("dave", "d@example.com", "Secret123", Extra::new())
            .await
            .unwrap();
        store.set_active(id, false).await.unwrap();
        assert!(!store.get_by_id(id).await.unwrap().unwrap().is_active);

        let err = store.set_active(UserId(999), false).await.unwrap_err();
        assert!(matches!(err, TurnstileError::NotFound(_)));
    }
}
