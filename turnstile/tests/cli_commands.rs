//! Integration tests for the management commands and the assembled app.

use turnstile::command::{load_settings, CommandRegistry};
use turnstile::web::{AppState, TurnstileApp};
use turnstile_test::TestClient;

// ── Helpers ──────────────────────────────────────────────────────────

fn write_settings(dir: &tempfile::TempDir) -> String {
    let db = dir.path().join("users.sqlite3");
    let path = dir.path().join("turnstile.toml");
    std::fs::write(
        &path,
        format!(
            "secret_key = \"cli-integration-secret-key-that-is-long-enough-0123\"\n\
             [database]\n\
             engine = \"sqlite\"\n\
             name = \"{}\"\n",
            db.to_string_lossy().replace('\\', "/")
        ),
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

async fn run(registry: &CommandRegistry, args: &[&str]) -> Result<(), String> {
    let matches = registry
        .build_cli()
        .try_get_matches_from(args)
        .map_err(|e| e.to_string())?;
    let settings = load_settings(&matches).map_err(|e| e.to_string())?;
    registry
        .execute(&matches, &settings)
        .await
        .map_err(|e| e.to_string())
}

// ═══════════════════════════════════════════════════════════════════════
// createuser, then log in through the pages
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_created_user_can_log_in() {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = write_settings(&dir);
    let registry = CommandRegistry::with_builtins();

    run(
        &registry,
        &[
            "turnstile",
            "--settings",
            &settings_path,
            "createuser",
            "--username",
            "alice",
            "--email",
            "alice@example.com",
            "--password",
            "Secret123",
        ],
    )
    .await
    .unwrap();

    let duplicate = run(
        &registry,
        &[
            "turnstile",
            "--settings",
            &settings_path,
            "createuser",
            "--username",
            "ALICE",
            "--email",
            "alice2@example.com",
            "--password",
            "Secret123",
        ],
    )
    .await
    .unwrap_err();
    assert!(duplicate.contains("A user with that username already exists."));

    let settings = turnstile::core::settings_loader::from_file(&settings_path).unwrap();
    let state = AppState::from_settings(settings).unwrap();
    let mut client = TestClient::new(TurnstileApp::new(state).into_router());

    client.get("/login").await;
    let token = client.cookie("csrftoken").unwrap().to_string();
    let response = client
        .post(
            "/login",
            &[
                ("csrfmiddlewaretoken", token.as_str()),
                ("username", "alice"),
                ("password", "Secret123"),
            ],
        )
        .await;
    assert_eq!(response.status_code(), 303);

    let dashboard = client.get("/dashboard").await;
    assert!(dashboard.contains("Welcome to your dashboard, alice!"));
}

// ═══════════════════════════════════════════════════════════════════════
// check
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_check_passes_for_configured_site() {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = write_settings(&dir);
    let registry = CommandRegistry::with_builtins();

    run(&registry, &["turnstile", "check", "--settings", &settings_path])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_check_fails_for_unknown_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, r#"{"database": {"engine": "postgres"}}"#).unwrap();
    let path = path.to_string_lossy().into_owned();

    let err = run(&CommandRegistry::with_builtins(), &["turnstile", "--settings", &path, "check"])
        .await
        .unwrap_err();
    assert!(err.contains("error(s)"));
}

#[tokio::test]
async fn test_unknown_subcommand_is_rejected() {
    let err = run(&CommandRegistry::with_builtins(), &["turnstile", "runserver"])
        .await
        .unwrap_err();
    assert!(err.contains("runserver"));
}
