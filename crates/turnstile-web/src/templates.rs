//! Page templates.
//!
//! Five [Tera](tera) templates are compiled into the binary: `base.html`,
//! `register.html`, `login.html`, `dashboard.html` and `error.html`. When
//! `templates_dir` is configured, every top-level `.html` file in it replaces
//! the built-in template of the same name (or adds a new one). All `.html`
//! templates are auto-escaped.

use std::path::{Path, PathBuf};

use tera::Tera;
use turnstile_core::error::{TurnstileError, TurnstileResult};
use turnstile_core::Settings;

const BUILTIN_TEMPLATES: [(&str, &str); 5] = [
    ("base.html", include_str!("../templates/base.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("dashboard.html", include_str!("../templates/dashboard.html")),
    ("error.html", include_str!("../templates/error.html")),
];

/// The compiled page templates.
#[derive(Debug)]
pub struct Templates {
    tera: Tera,
}

impl Templates {
    /// Compiles the built-in templates.
    pub fn builtin() -> TurnstileResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(BUILTIN_TEMPLATES)
            .map_err(template_error)?;
        Ok(Self { tera })
    }

    /// Compiles the built-in templates, then the overrides found in `dir`.
    pub fn with_overrides(dir: &Path) -> TurnstileResult<Self> {
        let mut templates = Self::builtin()?;

        let entries = std::fs::read_dir(dir).map_err(|e| {
            TurnstileError::ConfigurationError(format!(
                "Cannot read templates_dir {}: {e}",
                dir.display()
            ))
        })?;
        let mut overrides: Vec<(PathBuf, Option<String>)> = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "html") {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned());
                overrides.push((path, name));
            }
        }

        tracing::debug!(dir = %dir.display(), count = overrides.len(), "Loading template overrides");
        templates
            .tera
            .add_template_files(overrides)
            .map_err(template_error)?;
        Ok(templates)
    }

    /// Compiles the templates described by the settings.
    pub fn from_settings(settings: &Settings) -> TurnstileResult<Self> {
        match &settings.templates_dir {
            Some(dir) => Self::with_overrides(dir),
            None => Self::builtin(),
        }
    }

    /// Renders the named template.
    pub fn render(&self, name: &str, context: &tera::Context) -> TurnstileResult<String> {
        self.tera.render(name, context).map_err(template_error)
    }

    /// Returns `true` if a template with this name is loaded.
    pub fn contains(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}

/// Flattens a Tera error and its causes into one message.
#[allow(clippy::needless_pass_by_value)]
fn template_error(e: tera::Error) -> TurnstileError {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(&e);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    TurnstileError::TemplateError(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_user(username: &str) -> tera::Context {
        let mut context = tera::Context::new();
        context.insert("user", &serde_json::json!({ "username": username }));
        context
    }

    #[test]
    fn test_builtin_templates_load() {
        let templates = Templates::builtin().unwrap();
        for (name, _) in BUILTIN_TEMPLATES {
            assert!(templates.contains(name), "{name} missing");
        }
    }

    #[test]
    fn test_render_dashboard() {
        let templates = Templates::builtin().unwrap();
        let html = templates
            .render("dashboard.html", &context_with_user("alice"))
            .unwrap();
        assert!(html.contains("Welcome to your dashboard, alice!"));
        assert!(html.contains(r#"href="/logout""#));
    }

    #[test]
    fn test_render_escapes_html() {
        let templates = Templates::builtin().unwrap();
        let html = templates
            .render("dashboard.html", &context_with_user("<script>"))
            .unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_unknown_template_is_an_error() {
        let templates = Templates::builtin().unwrap();
        let err = templates
            .render("missing.html", &tera::Context::new())
            .unwrap_err();
        assert!(matches!(err, TurnstileError::TemplateError(_)));
    }

    #[test]
    fn test_overrides_replace_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("dashboard.html"),
            "{% extends \"base.html\" %}{% block content %}Hi {{ user.username }}{% endblock content %}",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let templates = Templates::with_overrides(dir.path()).unwrap();
        let html = templates
            .render("dashboard.html", &context_with_user("alice"))
            .unwrap();
        assert!(html.contains("Hi alice"));
        assert!(!html.contains("Welcome to your dashboard"));
        // Untouched templates keep their built-in content.
        assert!(templates.contains("login.html"));
        assert!(!templates.contains("notes.txt"));
    }

    #[test]
    fn test_missing_override_dir() {
        let err = Templates::with_overrides(Path::new("/nonexistent/turnstile/templates"))
            .unwrap_err();
        assert!(matches!(err, TurnstileError::ConfigurationError(_)));
    }
}
