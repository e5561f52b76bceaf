//! SQLite credential store using `rusqlite`.
//!
//! All statements run via `tokio::task::spawn_blocking` on a single
//! connection guarded by a `Mutex`. Username uniqueness is enforced by a
//! `UNIQUE` index on the case-folded username, so the database itself
//! arbitrates concurrent registrations.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tokio::sync::Mutex;
use turnstile_core::error::{TurnstileError, TurnstileResult};

use crate::hashers;
use crate::store::{conflict, CredentialStore};
use crate::user::{normalize_email, username_key, Extra, User, UserId};

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS turnstile_user (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        username_key TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL,
        password TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        date_joined TEXT NOT NULL,
        extra TEXT NOT NULL DEFAULT '{}'
    );
";

const SELECT_USER: &str =
    "SELECT id, username, email, password, is_active, date_joined, extra FROM turnstile_user";

/// A credential store backed by a SQLite database file.
///
/// The `turnstile_user` table is created on open if missing.
pub struct SqliteCredentialStore {
    /// The path to the database file (or ":memory:").
    path: PathBuf,
    /// The connection, guarded by an async mutex.
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl std::fmt::Debug for SqliteCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCredentialStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteCredentialStore {
    /// Opens (or creates) the database at the given path.
    ///
    /// If the path is `:memory:`, an in-memory database is created.
    pub fn open(path: impl Into<PathBuf>) -> TurnstileResult<Self> {
        let path = path.into();
        let conn = if path.to_str() == Some(":memory:") {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| TurnstileError::DatabaseError(format!("SQLite open failed: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| TurnstileError::DatabaseError(format!("Failed to set pragmas: {e}")))?;
        conn.execute_batch(CREATE_TABLE)
            .map_err(|e| TurnstileError::DatabaseError(format!("Failed to create table: {e}")))?;

        tracing::debug!(path = %path.display(), "Opened SQLite credential store");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (convenience constructor).
    pub fn memory() -> TurnstileResult<Self> {
        Self::open(":memory:")
    }

    /// Returns the database file path.
    pub const fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> TurnstileResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> TurnstileResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(|e| TurnstileError::DatabaseError(format!("Task join error: {e}")))?
    }

    fn query_user(
        conn: &rusqlite::Connection,
        clause: &str,
        param: &dyn rusqlite::ToSql,
    ) -> TurnstileResult<Option<User>> {
        let sql = format!("{SELECT_USER} WHERE {clause}");
        let raw = conn
            .query_row(&sql, [param], RawUser::from_row)
            .optional()
            .map_err(db_error)?;
        raw.map(RawUser::into_user).transpose()
    }
}

/// A row as stored, before the text columns are parsed.
struct RawUser {
    id: i64,
    username: String,
    email: String,
    password: String,
    is_active: bool,
    date_joined: String,
    extra: String,
}

impl RawUser {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password: row.get(3)?,
            is_active: row.get(4)?,
            date_joined: row.get(5)?,
            extra: row.get(6)?,
        })
    }

    fn into_user(self) -> TurnstileResult<User> {
        let date_joined = DateTime::parse_from_rfc3339(&self.date_joined)
            .map_err(|e| TurnstileError::DatabaseError(format!("Bad date_joined: {e}")))?
            .with_timezone(&Utc);
        let extra: Extra = serde_json::from_str(&self.extra)
            .map_err(|e| TurnstileError::DatabaseError(format!("Bad extra column: {e}")))?;
        Ok(User {
            id: UserId(self.id),
            username: self.username,
            email: self.email,
            password: self.password,
            is_active: self.is_active,
            date_joined,
            extra,
        })
    }
}

#[allow(clippy::needless_pass_by_value)]
fn db_error(e: rusqlite::Error) -> TurnstileError {
    TurnstileError::DatabaseError(e.to_string())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::ConstraintViolation,
                ..
            },
            _
        )
    )
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        extra: Extra,
    ) -> TurnstileResult<UserId> {
        let password = hashers::make_password(password).await?;
        let username = username.to_string();
        let key = username_key(&username);
        let email = normalize_email(email);
        let extra = serde_json::to_string(&extra)
            .map_err(|e| TurnstileError::InternalServerError(format!("Bad extra fields: {e}")))?;
        let date_joined = Utc::now().to_rfc3339();

        let id = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO turnstile_user \
                     (username, username_key, email, password, is_active, date_joined, extra) \
                     VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
                    params![username, key, email, password, date_joined, extra],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        conflict(&username)
                    } else {
                        db_error(e)
                    }
                })?;
                Ok(UserId(conn.last_insert_rowid()))
            })
            .await?;

        tracing::debug!(user_id = %id, "Stored new user");
        Ok(id)
    }

    async fn get_by_username(&self, username: &str) -> TurnstileResult<Option<User>> {
        let username = username.to_string();
        self.with_conn(move |conn| Self::query_user(conn, "username = ?1", &username))
            .await
    }

    async fn get_by_id(&self, id: UserId) -> TurnstileResult<Option<User>> {
        self.with_conn(move |conn| Self::query_user(conn, "id = ?1", &id.0))
            .await
    }

    async fn username_taken(&self, username: &str) -> TurnstileResult<bool> {
        let key = username_key(username);
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM turnstile_user WHERE username_key = ?1)",
                [key],
                |row| row.get(0),
            )
            .map_err(db_error)
        })
        .await
    }

    async fn count(&self) -> TurnstileResult<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM turnstile_user", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(db_error)
            .and_then(|n| {
                usize::try_from(n).map_err(|e| TurnstileError::DatabaseError(e.to_string()))
            })
        })
        .await
    }

    async fn set_active(&self, id: UserId, is_active: bool) -> TurnstileResult<()> {
        let changed = self
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE turnstile_user SET is_active = ?1 WHERE id = ?2",
                    params![is_active, id.0],
                )
                .map_err(db_error)
            })
            .await?;
        if changed == 0 {
            return Err(TurnstileError::NotFound(format!("User {id} not found")));
        }
        Ok(())
    }
}
