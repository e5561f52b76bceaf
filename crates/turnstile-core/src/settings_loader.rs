//! Settings loading from configuration files.
//!
//! This module provides functions to load [`Settings`] from TOML files, JSON
//! files, and to apply environment variable overrides.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `TURNSTILE_SECRET_KEY` | `secret_key` |
//! | `TURNSTILE_DEBUG` | `debug` |
//! | `TURNSTILE_HOST` | `host` |
//! | `TURNSTILE_PORT` | `port` |
//! | `TURNSTILE_LOG_LEVEL` | `log_level` |
//! | `TURNSTILE_DATABASE_ENGINE` | `database.engine` |
//! | `TURNSTILE_DATABASE_NAME` | `database.name` |
//! | `TURNSTILE_SESSION_COOKIE_NAME` | `session_cookie_name` |
//! | `TURNSTILE_SESSION_COOKIE_SECURE` | `session_cookie_secure` |
//! | `TURNSTILE_TEMPLATES_DIR` | `templates_dir` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use turnstile_core::settings_loader;
//!
//! // Pick the format from the file extension, then apply the environment.
//! let settings = settings_loader::from_file_with_env("turnstile.toml").unwrap();
//! ```

use std::path::{Path, PathBuf};

use crate::error::{TurnstileError, TurnstileResult};
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Any fields not present in the TOML keep their default values.
pub fn from_toml_str(toml_str: &str) -> TurnstileResult<Settings> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| TurnstileError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> TurnstileResult<Settings> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> TurnstileResult<Settings> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| TurnstileError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> TurnstileResult<Settings> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from a file, choosing the format by extension.
///
/// `.json` files are parsed as JSON; everything else as TOML.
pub fn from_file(path: impl AsRef<Path>) -> TurnstileResult<Settings> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        from_json_file(path)
    } else {
        from_toml_file(path)
    }
}

/// Loads settings from a file and then applies environment variable overrides.
pub fn from_file_with_env(path: impl AsRef<Path>) -> TurnstileResult<Settings> {
    let mut settings = from_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `TURNSTILE_*` environment variable overrides to a settings struct.
///
/// Boolean variables accept "true"/"1"/"yes" (case-insensitive) as true and
/// anything else as false. A `TURNSTILE_PORT` that is not a valid port number
/// is ignored.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("TURNSTILE_SECRET_KEY") {
        settings.secret_key = val;
    }

    if let Ok(val) = std::env::var("TURNSTILE_DEBUG") {
        settings.debug = parse_bool(&val);
    }

    if let Ok(val) = std::env::var("TURNSTILE_HOST") {
        settings.host = val;
    }

    if let Ok(val) = std::env::var("TURNSTILE_PORT") {
        if let Ok(port) = val.parse::<u16>() {
            settings.port = port;
        }
    }

    if let Ok(val) = std::env::var("TURNSTILE_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("TURNSTILE_DATABASE_ENGINE") {
        settings.database.engine = val;
    }

    if let Ok(val) = std::env::var("TURNSTILE_DATABASE_NAME") {
        settings.database.name = val;
    }

    if let Ok(val) = std::env::var("TURNSTILE_SESSION_COOKIE_NAME") {
        settings.session_cookie_name = val;
    }

    if let Ok(val) = std::env::var("TURNSTILE_SESSION_COOKIE_SECURE") {
        settings.session_cookie_secure = parse_bool(&val);
    }

    if let Ok(val) = std::env::var("TURNSTILE_TEMPLATES_DIR") {
        settings.templates_dir = if val.is_empty() {
            None
        } else {
            Some(PathBuf::from(val))
        };
    }
}

// ============================================================
// Helpers
// ============================================================

fn parse_bool(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn read_config(path: &Path, format: &str) -> TurnstileResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        TurnstileError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

/// Deep-merges a parsed configuration over the serialized defaults.
fn merge_over_defaults(value: serde_json::Value, format: &str) -> TurnstileResult<Settings> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        TurnstileError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        TurnstileError::ConfigurationError(format!(
            "Failed to deserialize settings from {format}: {e}"
        ))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── TOML loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            secret_key = "my-secret-key"
            debug = false
            port = 9000
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.secret_key, "my-secret-key");
        assert!(!settings.debug);
        assert_eq!(settings.port, 9000);
        // Defaults preserved
        assert_eq!(settings.login_url, "/login");
    }

    #[test]
    fn test_from_toml_str_nested_tables_keep_defaults() {
        let toml = r#"
            [database]
            engine = "sqlite"

            [password_validation]
            min_length = 12
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.database.engine, "sqlite");
        assert_eq!(settings.database.name, "turnstile.sqlite3");
        assert_eq!(settings.password_validation.min_length, 12);
        assert!(settings.password_validation.reject_common);
    }

    #[test]
    fn test_from_toml_str_templates_dir() {
        let settings = from_toml_str(r#"templates_dir = "/srv/templates""#).unwrap();
        assert_eq!(settings.templates_dir, Some(PathBuf::from("/srv/templates")));
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert!(settings.debug);
        assert!(settings.secret_key.is_empty());
    }

    #[test]
    fn test_from_toml_str_ignores_unknown_keys() {
        let toml = r#"
            port = 9001
            custom_flag = true

            [extra]
            theme = "dark"
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.port, 9001);
        let json = serde_json::to_value(&settings).unwrap();
        assert!(json.get("extra").is_none());
        assert!(json.get("custom_flag").is_none());
    }

    #[test]
    fn test_from_toml_str_invalid() {
        assert!(from_toml_str("[[invalid toml content").is_err());
    }

    #[test]
    fn test_from_toml_str_wrong_type() {
        let err = from_toml_str(r#"port = "not-a-port""#).unwrap_err();
        assert!(matches!(err, TurnstileError::ConfigurationError(_)));
    }

    // ── JSON loading ────────────────────────────────────────────────

    #[test]
    fn test_from_json_str_basic() {
        let json = r#"{
            "secret_key": "json-secret",
            "debug": false,
            "log_level": "debug",
            "database": {"engine": "sqlite", "name": "/tmp/users.db"}
        }"#;

        let settings = from_json_str(json).unwrap();
        assert_eq!(settings.secret_key, "json-secret");
        assert!(!settings.debug);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.database.name, "/tmp/users.db");
        assert_eq!(settings.session_cookie_name, "sessionid");
    }

    #[test]
    fn test_from_json_str_empty_object() {
        let settings = from_json_str("{}").unwrap();
        assert!(settings.debug);
        assert!(settings.secret_key.is_empty());
    }

    #[test]
    fn test_from_json_str_invalid() {
        assert!(from_json_str("{invalid json").is_err());
    }

    // ── File loading ────────────────────────────────────────────────

    #[test]
    fn test_from_file_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("settings.toml");
        std::fs::write(&toml_path, "secret_key = \"file-secret\"\ndebug = false\n").unwrap();
        let settings = from_file(&toml_path).unwrap();
        assert_eq!(settings.secret_key, "file-secret");
        assert!(!settings.debug);

        let json_path = dir.path().join("settings.json");
        std::fs::write(&json_path, r#"{"secret_key": "json-file-secret"}"#).unwrap();
        let settings = from_file(&json_path).unwrap();
        assert_eq!(settings.secret_key, "json-file-secret");
    }

    #[test]
    fn test_from_file_missing() {
        assert!(from_toml_file("/nonexistent/path/settings.toml").is_err());
        assert!(from_json_file("/nonexistent/path/settings.json").is_err());
    }

    // ── Environment variable overrides ──────────────────────────────

    // Environment variables are process-global, so every override is
    // exercised from a single test.
    #[test]
    fn test_env_overrides() {
        let vars = [
            ("TURNSTILE_SECRET_KEY", "env-secret"),
            ("TURNSTILE_DEBUG", "false"),
            ("TURNSTILE_HOST", "0.0.0.0"),
            ("TURNSTILE_PORT", "8080"),
            ("TURNSTILE_LOG_LEVEL", "debug"),
            ("TURNSTILE_DATABASE_ENGINE", "sqlite"),
            ("TURNSTILE_DATABASE_NAME", "/var/lib/turnstile.db"),
            ("TURNSTILE_SESSION_COOKIE_NAME", "sid"),
            ("TURNSTILE_SESSION_COOKIE_SECURE", "1"),
            ("TURNSTILE_TEMPLATES_DIR", "/srv/templates"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }

        let settings = from_env();
        assert_eq!(settings.secret_key, "env-secret");
        assert!(!settings.debug);
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.database.engine, "sqlite");
        assert_eq!(settings.database.name, "/var/lib/turnstile.db");
        assert_eq!(settings.session_cookie_name, "sid");
        assert!(settings.session_cookie_secure);
        assert_eq!(settings.templates_dir, Some(PathBuf::from("/srv/templates")));

        // Invalid port is ignored.
        std::env::set_var("TURNSTILE_PORT", "not-a-number");
        let settings = from_env();
        assert_eq!(settings.port, 8000);

        // Environment wins over the file.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "secret_key = \"toml-secret\"\ndebug = true\n").unwrap();
        let settings = from_file_with_env(&path).unwrap();
        assert_eq!(settings.secret_key, "env-secret");
        assert!(!settings.debug);

        for (key, _) in vars {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("YES"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("whatever"));
    }

    // ── merge_json helper ───────────────────────────────────────────

    #[test]
    fn test_merge_json_nested() {
        let base = serde_json::json!({"outer": {"a": 1, "b": 2}, "c": 3});
        let over = serde_json::json!({"outer": {"b": 4}});
        let merged = merge_json(base, over);
        assert_eq!(merged["outer"]["a"], 1);
        assert_eq!(merged["outer"]["b"], 4);
        assert_eq!(merged["c"], 3);
    }

    #[test]
    fn test_merge_json_array_override() {
        let base = serde_json::json!({"list": [1, 2, 3]});
        let over = serde_json::json!({"list": [4, 5]});
        let merged = merge_json(base, over);
        // Arrays are replaced, not merged
        assert_eq!(merged["list"], serde_json::json!([4, 5]));
    }

    #[test]
    fn test_toml_to_json() {
        let toml_val: toml::Value = toml::from_str(
            r#"
            name = "test"
            count = 42
            flag = true
            [nested]
            key = "value"
        "#,
        )
        .unwrap();

        let json = toml_to_json(toml_val);
        assert_eq!(json["name"], "test");
        assert_eq!(json["count"], 42);
        assert_eq!(json["flag"], true);
        assert_eq!(json["nested"]["key"], "value");
    }
}
