//! Shared application state.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use turnstile_auth::session::{InMemorySessionBackend, SessionBackend, SessionController};
use turnstile_auth::{CredentialStore, InMemoryCredentialStore, PasswordPolicy, SqliteCredentialStore};
use turnstile_core::error::{TurnstileError, TurnstileResult};
use turnstile_core::settings::{DatabaseSettings, Settings};

use crate::templates::Templates;

/// Everything a request handler needs, cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    /// The application settings.
    pub settings: Arc<Settings>,
    /// The credential store.
    pub store: Arc<dyn CredentialStore>,
    /// The session controller.
    pub sessions: SessionController,
    /// The compiled page templates.
    pub templates: Arc<Templates>,
    /// The password policy applied at registration.
    pub policy: Arc<PasswordPolicy>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.sessions)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assembles the state from explicit storage backends.
    ///
    /// Fails if no secret key can be established or the templates do not
    /// compile.
    pub fn new(
        mut settings: Settings,
        store: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionBackend>,
    ) -> TurnstileResult<Self> {
        settings.ensure_secret_key()?;
        // A session issued now must be able to carry its expiry date.
        let cookie_age = i64::try_from(settings.session_cookie_age)
            .ok()
            .filter(|age| {
                TimeDelta::try_seconds(*age)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .is_some()
            })
            .ok_or_else(|| {
                TurnstileError::ConfigurationError(format!(
                    "session_cookie_age {} is out of range",
                    settings.session_cookie_age
                ))
            })?;

        let templates = Templates::from_settings(&settings)?;
        let policy = PasswordPolicy::from_settings(&settings.password_validation);
        let controller =
            SessionController::new(sessions, store.clone(), &settings.secret_key, cookie_age)
                .with_fallback_keys(settings.secret_key_fallbacks.clone());

        Ok(Self {
            settings: Arc::new(settings),
            store,
            sessions: controller,
            templates: Arc::new(templates),
            policy: Arc::new(policy),
        })
    }

    /// Assembles the state with the configured credential store and
    /// in-memory sessions.
    pub fn from_settings(settings: Settings) -> TurnstileResult<Self> {
        let store = open_credential_store(&settings.database)?;
        Self::new(settings, store, Arc::new(InMemorySessionBackend::new()))
    }
}

/// Opens the credential store named by `database.engine`.
pub fn open_credential_store(
    database: &DatabaseSettings,
) -> TurnstileResult<Arc<dyn CredentialStore>> {
    match database.engine.as_str() {
        "memory" => Ok(Arc::new(InMemoryCredentialStore::new())),
        "sqlite" => Ok(Arc::new(SqliteCredentialStore::open(&database.name)?)),
        other => Err(TurnstileError::ConfigurationError(format!(
            "Unknown database engine '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_generates_key_in_debug() {
        let state = AppState::from_settings(Settings::default()).unwrap();
        assert_eq!(state.settings.secret_key.len(), 50);
    }

    #[test]
    fn test_new_requires_key_outside_debug() {
        let settings = Settings {
            debug: false,
            ..Settings::default()
        };
        let err = AppState::from_settings(settings).unwrap_err();
        assert!(matches!(err, TurnstileError::ConfigurationError(_)));
    }

    #[test]
    fn test_cookie_age_out_of_range() {
        for age in [u64::MAX, 10_000_000_000_000] {
            let settings = Settings {
                session_cookie_age: age,
                ..Settings::default()
            };
            let err = AppState::from_settings(settings).unwrap_err();
            assert!(err.to_string().contains("out of range"), "age {age}");
        }

        let settings = Settings {
            session_cookie_age: 31_536_000,
            ..Settings::default()
        };
        assert!(AppState::from_settings(settings).is_ok());
    }

    #[test]
    fn test_open_credential_store() {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = DatabaseSettings {
            engine: "sqlite".to_string(),
            name: dir.path().join("db.sqlite3").to_string_lossy().into_owned(),
        };
        assert!(open_credential_store(&sqlite).is_ok());
        assert!(open_credential_store(&DatabaseSettings::default()).is_ok());

        let unknown = DatabaseSettings {
            engine: "postgres".to_string(),
            name: String::new(),
        };
        let err = open_credential_store(&unknown).err().unwrap();
        assert!(err.to_string().contains("postgres"));
    }
}
