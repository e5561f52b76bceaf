//! Integration tests for the register → login → resolve → logout pipeline.
//!
//! Exercises the credential stores, form validation and the session
//! controller together, including concurrent registrations.

use std::sync::Arc;

use turnstile_auth::forms::{
    register, validate_login, LoginForm, RegistrationForm, DUPLICATE_USERNAME_MESSAGE,
    PASSWORD_MISMATCH_MESSAGE,
};
use turnstile_auth::session::{InMemorySessionBackend, SessionController};
use turnstile_auth::{
    CredentialStore, Extra, InMemoryCredentialStore, PasswordPolicy, SqliteCredentialStore,
};
use turnstile_core::TurnstileError;

// ── Helpers ──────────────────────────────────────────────────────────

fn registration(username: &str, p1: &str, p2: &str) -> RegistrationForm {
    RegistrationForm {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password1: p1.to_string(),
        password2: p2.to_string(),
    }
}

fn login_form(username: &str, password: &str) -> LoginForm {
    LoginForm {
        username: username.to_string(),
        password: password.to_string(),
    }
}

fn controller(store: Arc<dyn CredentialStore>) -> SessionController {
    SessionController::new(
        Arc::new(InMemorySessionBackend::new()),
        store,
        "integration-secret",
        1_209_600,
    )
}

async fn full_cycle(store: Arc<dyn CredentialStore>) {
    let policy = PasswordPolicy::default();
    let sessions = controller(store.clone());

    register(&registration("alice", "Secret123", "Secret123"), store.as_ref(), &policy)
        .await
        .unwrap();

    let user = validate_login(&login_form("alice", "Secret123"), store.as_ref())
        .await
        .unwrap();
    let cookie = sessions.login(None, &user).await.unwrap();

    let state = sessions.resolve(Some(&cookie)).await.unwrap();
    assert_eq!(state.user().unwrap().username, "alice");

    sessions.logout(Some(&cookie)).await.unwrap();
    assert!(!sessions.resolve(Some(&cookie)).await.unwrap().is_authenticated());
}

// ═══════════════════════════════════════════════════════════════════════
// 1. END-TO-END CYCLE
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn full_cycle_in_memory() {
    full_cycle(Arc::new(InMemoryCredentialStore::new())).await;
}

#[tokio::test]
async fn full_cycle_sqlite() {
    full_cycle(Arc::new(SqliteCredentialStore::memory().unwrap())).await;
}

#[tokio::test]
async fn mismatched_passwords_create_nothing() {
    let store = InMemoryCredentialStore::new();
    let err = register(
        &registration("bob", "pw1", "pw2"),
        &store,
        &PasswordPolicy::default(),
    )
    .await
    .unwrap_err();

    let TurnstileError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.get("password2"), [PASSWORD_MISMATCH_MESSAGE]);
    assert_eq!(store.count().await.unwrap(), 0);

    let err = validate_login(&login_form("bob", "pw1"), &store)
        .await
        .unwrap_err();
    assert!(matches!(err, TurnstileError::InvalidCredentials));
}

#[tokio::test]
async fn wrong_password_never_opens_a_session() {
    let store = InMemoryCredentialStore::new();
    store
        .create_user("alice", "alice@example.com", "Secret123", Extra::new())
        .await
        .unwrap();

    for (username, password) in [("alice", "Secret124"), ("alice", ""), ("nobody", "Secret123")] {
        let result = validate_login(&login_form(username, password), &store).await;
        assert!(result.is_err(), "{username}/{password} should be refused");
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 2. CONCURRENT REGISTRATION
// ═══════════════════════════════════════════════════════════════════════

async fn race_registrations(store: Arc<dyn CredentialStore>) {
    const CONTENDERS: usize = 6;

    let mut handles = Vec::new();
    for i in 0..CONTENDERS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .create_user("carol", &format!("carol{i}@example.com"), "Secret123", Extra::new())
                .await
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(TurnstileError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(conflicts, CONTENDERS - 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_in_memory() {
    race_registrations(Arc::new(InMemoryCredentialStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteCredentialStore::open(dir.path().join("race.db")).unwrap();
    race_registrations(Arc::new(store)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_form_registrations_report_field_error() {
    let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
    let policy = Arc::new(PasswordPolicy::default());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        let policy = policy.clone();
        handles.push(tokio::spawn(async move {
            register(
                &registration("dave", "Secret123", "Secret123"),
                store.as_ref(),
                &policy,
            )
            .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(TurnstileError::Validation(errors)) => {
                assert_eq!(errors.get("username"), [DUPLICATE_USERNAME_MESSAGE]);
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
}

// ═══════════════════════════════════════════════════════════════════════
// 3. SESSIONS ACROSS USERS
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn sessions_are_independent() {
    let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
    let sessions = controller(store.clone());
    for name in ["erin", "frank"] {
        store
            .create_user(name, &format!("{name}@example.com"), "Secret123", Extra::new())
            .await
            .unwrap();
    }

    let erin = store.get_by_username("erin").await.unwrap().unwrap();
    let frank = store.get_by_username("frank").await.unwrap().unwrap();
    let erin_cookie = sessions.login(None, &erin).await.unwrap();
    let frank_cookie = sessions.login(None, &frank).await.unwrap();

    sessions.logout(Some(&erin_cookie)).await.unwrap();

    assert!(!sessions.resolve(Some(&erin_cookie)).await.unwrap().is_authenticated());
    let state = sessions.resolve(Some(&frank_cookie)).await.unwrap();
    assert_eq!(state.user().unwrap().username, "frank");
}
