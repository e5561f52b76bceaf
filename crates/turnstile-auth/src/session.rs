//! Server-side sessions and the authentication state machine.
//!
//! A request is either [`AuthState::Anonymous`] or
//! [`AuthState::Authenticated`]. [`SessionController`] moves between the two:
//!
//! - [`SessionController::resolve`] - Maps an incoming session cookie to a state
//! - [`SessionController::login`] - Anonymous to Authenticated, cycling the session key
//! - [`SessionController::logout`] - Authenticated to Anonymous, deleting the session
//!
//! ## Session Keys
//!
//! Authentication state is stored in the session data under two keys:
//! - `_auth_user_id` - The authenticated user's id
//! - `_auth_user_hash` - A fragment of the password hash for invalidation
//!
//! The cookie value is the session key signed with the secret key. A cookie
//! that fails verification is treated exactly like no cookie at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use turnstile_core::error::{TurnstileError, TurnstileResult};
use turnstile_core::signing::{random_hex_token, Signer};

use crate::store::CredentialStore;
use crate::user::{AuthState, User, UserId};

/// Session key for storing the authenticated user's id.
pub const SESSION_USER_KEY: &str = "_auth_user_id";
/// Session key for the password hash fragment (to detect password changes).
pub const SESSION_HASH_KEY: &str = "_auth_user_hash";

/// Random bytes per session key. Keys are hex-encoded, so twice as long.
const SESSION_KEY_BYTES: usize = 32;

const SESSION_SALT: &str = "turnstile.sessions.SessionController";

/// Characters left unescaped in the `next` query parameter.
const NEXT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// ASCII characters escaped in a redirect target. Non-ASCII is always escaped.
const LOCATION_ENCODE_SET: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');

/// Data associated with a user session.
#[derive(Debug, Clone)]
pub struct SessionData {
    /// The unique session key identifying this session.
    pub session_key: String,
    /// The session data stored as a map of string keys to JSON values.
    pub data: HashMap<String, serde_json::Value>,
    /// The timestamp when this session expires.
    pub expire_date: DateTime<Utc>,
}

impl SessionData {
    /// Creates a new empty session expiring `lifetime_seconds` from now.
    ///
    /// Lifetimes past the representable range saturate at the latest (or
    /// earliest) possible instant.
    pub fn with_lifetime(session_key: String, lifetime_seconds: i64) -> Self {
        let expire_date = TimeDelta::try_seconds(lifetime_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .unwrap_or(if lifetime_seconds < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            });
        Self {
            session_key,
            data: HashMap::new(),
            expire_date,
        }
    }

    /// Gets a value from the session by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Sets a value in the session.
    pub fn set(&mut self, key: &str, value: serde_json::Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Returns `true` if the session has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expire_date
    }
}

/// A backend for storing and retrieving session data.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Loads the unexpired session with this key.
    async fn load(&self, session_key: &str) -> TurnstileResult<Option<SessionData>>;

    /// Inserts or replaces a session.
    async fn save(&self, session: &SessionData) -> TurnstileResult<()>;

    /// Deletes a session by its key. Deleting a missing key is not an error.
    async fn delete(&self, session_key: &str) -> TurnstileResult<()>;

    /// Checks whether an unexpired session with the given key exists.
    async fn exists(&self, session_key: &str) -> TurnstileResult<bool>;

    /// Removes all expired sessions and returns how many were removed.
    async fn clear_expired(&self) -> TurnstileResult<usize>;
}

/// An in-memory session backend.
///
/// Sessions are lost when the process exits. Cloning shares the underlying
/// map.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionBackend {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
}

impl InMemorySessionBackend {
    /// Creates a new in-memory session backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sessions, expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no sessions are stored.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionBackend for InMemorySessionBackend {
    async fn load(&self, session_key: &str) -> TurnstileResult<Option<SessionData>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_key)
            .filter(|s| !s.is_expired())
            .cloned())
    }

    async fn save(&self, session: &SessionData) -> TurnstileResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_key.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_key: &str) -> TurnstileResult<()> {
        self.sessions.write().await.remove(session_key);
        Ok(())
    }

    async fn exists(&self, session_key: &str) -> TurnstileResult<bool> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_key)
            .is_some_and(|s| !s.is_expired()))
    }

    async fn clear_expired(&self) -> TurnstileResult<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        Ok(before - sessions.len())
    }
}

// ============================================================
// SessionController
// ============================================================

/// Drives the Anonymous/Authenticated state machine.
#[derive(Clone)]
pub struct SessionController {
    sessions: Arc<dyn SessionBackend>,
    store: Arc<dyn CredentialStore>,
    signer: Signer,
    cookie_age: i64,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("signer", &self.signer)
            .field("cookie_age", &self.cookie_age)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Creates a controller signing cookies with `secret_key`.
    ///
    /// `cookie_age` is the session lifetime in seconds.
    pub fn new(
        sessions: Arc<dyn SessionBackend>,
        store: Arc<dyn CredentialStore>,
        secret_key: &str,
        cookie_age: i64,
    ) -> Self {
        Self {
            sessions,
            store,
            signer: Signer::new(secret_key).with_salt(SESSION_SALT),
            cookie_age,
        }
    }

    /// Also accepts cookies signed with any of `keys` (retired secret keys).
    /// New cookies are always signed with the primary key.
    #[must_use]
    pub fn with_fallback_keys(mut self, keys: Vec<String>) -> Self {
        self.signer = self.signer.with_fallback_keys(keys);
        self
    }

    /// Returns the session lifetime in seconds.
    pub const fn cookie_age(&self) -> i64 {
        self.cookie_age
    }

    /// Returns the session backend.
    pub fn sessions(&self) -> &Arc<dyn SessionBackend> {
        &self.sessions
    }

    /// Extracts the session key from a signed cookie value.
    ///
    /// Returns `None` for bad signatures and for anything that is not a
    /// well-formed session key.
    pub fn session_key(&self, cookie: &str) -> Option<String> {
        let key = self.signer.unsign(cookie).ok()?;
        let well_formed = key.len() == SESSION_KEY_BYTES * 2
            && key.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then_some(key)
    }

    /// Resolves the authentication state for a request.
    ///
    /// Anything short of a verified, unexpired session for an existing,
    /// active user with an unchanged password yields
    /// [`AuthState::Anonymous`]. Storage failures are propagated.
    pub async fn resolve(&self, cookie: Option<&str>) -> TurnstileResult<AuthState> {
        let Some(key) = cookie.and_then(|c| self.session_key(c)) else {
            return Ok(AuthState::Anonymous);
        };
        let Some(session) = self.sessions.load(&key).await? else {
            return Ok(AuthState::Anonymous);
        };
        if session.is_expired() {
            return Ok(AuthState::Anonymous);
        }

        let Some(user_id) = session.get(SESSION_USER_KEY).and_then(serde_json::Value::as_i64)
        else {
            return Ok(AuthState::Anonymous);
        };
        let Some(user) = self.store.get_by_id(UserId(user_id)).await? else {
            return Ok(AuthState::Anonymous);
        };
        if !user.is_active {
            return Ok(AuthState::Anonymous);
        }

        let stored_hash = session
            .get(SESSION_HASH_KEY)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        if stored_hash != user.session_auth_hash() {
            tracing::info!(user_id, "Session fingerprint mismatch, flushing session");
            self.sessions.delete(&key).await?;
            return Ok(AuthState::Anonymous);
        }

        Ok(AuthState::Authenticated(user))
    }

    /// Establishes an authenticated session for `user`.
    ///
    /// Any session named by `current_cookie` is deleted first and a fresh key
    /// is issued, so a key planted before login never becomes authenticated.
    /// Returns the signed cookie value for the new session.
    pub async fn login(&self, current_cookie: Option<&str>, user: &User) -> TurnstileResult<String> {
        if let Some(old_key) = current_cookie.and_then(|c| self.session_key(c)) {
            self.sessions.delete(&old_key).await?;
        }

        let mut session = SessionData::with_lifetime(random_hex_token(SESSION_KEY_BYTES), self.cookie_age);
        session.set(SESSION_USER_KEY, serde_json::json!(user.id.0));
        session.set(
            SESSION_HASH_KEY,
            serde_json::Value::String(user.session_auth_hash()),
        );
        self.sessions.save(&session).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "User logged in");
        Ok(self.signer.sign(&session.session_key))
    }

    /// Tears down the session named by `cookie`, if any.
    ///
    /// Succeeds whether or not a session existed.
    pub async fn logout(&self, cookie: Option<&str>) -> TurnstileResult<()> {
        if let Some(key) = cookie.and_then(|c| self.session_key(c)) {
            self.sessions.delete(&key).await?;
            tracing::info!("User logged out");
        }
        Ok(())
    }
}

// ============================================================
// Guards and redirects
// ============================================================

/// Returns the authenticated user, or [`TurnstileError::LoginRequired`].
pub fn require_login(state: &AuthState) -> TurnstileResult<&User> {
    state.user().ok_or(TurnstileError::LoginRequired)
}

/// Builds the login redirect target carrying the originally requested path.
///
/// ```
/// use turnstile_auth::session::redirect_to_login;
///
/// assert_eq!(redirect_to_login("/login", "/dashboard"), "/login?next=/dashboard");
/// ```
pub fn redirect_to_login(login_url: &str, next: &str) -> String {
    let sep = if login_url.contains('?') { '&' } else { '?' };
    format!(
        "{login_url}{sep}next={}",
        utf8_percent_encode(next, NEXT_ENCODE_SET)
    )
}

/// Returns `true` if `url` is a local path that is safe to redirect to.
///
/// Absolute URLs, protocol-relative `//host` paths and anything containing
/// backslashes or control characters are rejected.
pub fn is_safe_redirect(url: &str) -> bool {
    url.starts_with('/')
        && !url.starts_with("//")
        && !url.contains('\\')
        && !url.chars().any(char::is_control)
}

/// Percent-encodes a local redirect target so it is valid in a `Location`
/// header. Reserved characters and existing escapes are kept.
///
/// ```
/// use turnstile_auth::session::encode_redirect;
///
/// assert_eq!(encode_redirect("/caf\u{e9}?q=1"), "/caf%C3%A9?q=1");
/// ```
pub fn encode_redirect(url: &str) -> String {
    utf8_percent_encode(url, LOCATION_ENCODE_SET).to_string()
}

/// Spawns a task that removes expired sessions every `interval`.
pub fn spawn_session_sweeper(
    sessions: Arc<dyn SessionBackend>,
    interval: StdDuration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match sessions.clear_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Swept expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
            }
        }
    })
}
