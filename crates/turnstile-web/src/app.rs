//! The application router and HTTP server.
//!
//! [`TurnstileApp`] wires the page handlers to their paths, wraps them in the
//! request-id and trace layers and serves them with axum.
//!
//! # Examples
//!
//! ```no_run
//! use turnstile_core::Settings;
//! use turnstile_web::{AppState, TurnstileApp};
//!
//! # async fn example() -> Result<(), turnstile_core::TurnstileError> {
//! let state = AppState::from_settings(Settings::default())?;
//! TurnstileApp::new(state).run("127.0.0.1:8000").await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use axum::body::Body;
use axum::routing::get;
use axum::Router;
use http::Request;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use turnstile_auth::session::spawn_session_sweeper;
use turnstile_core::error::{TurnstileError, TurnstileResult};
use turnstile_core::logging::request_span;

use crate::state::AppState;
use crate::views;

/// How often expired sessions are purged while serving.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// The turnstile web application.
#[derive(Debug, Clone)]
pub struct TurnstileApp {
    state: AppState,
}

impl TurnstileApp {
    /// Creates the application around prepared state.
    pub const fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Returns the shared state.
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Converts the application into an axum router.
    ///
    /// Unknown paths render the 404 page; known paths requested with an
    /// unsupported method render the 405 page.
    pub fn into_router(self) -> Router {
        Router::new()
            .route("/", get(views::index).fallback(views::method_not_allowed))
            .route(
                "/register",
                get(views::register_page)
                    .post(views::register_submit)
                    .fallback(views::method_not_allowed),
            )
            .route(
                "/login",
                get(views::login_page)
                    .post(views::login_submit)
                    .fallback(views::method_not_allowed),
            )
            .route(
                "/logout",
                get(views::logout_get)
                    .post(views::logout_post)
                    .fallback(views::method_not_allowed),
            )
            .route(
                "/dashboard",
                get(views::dashboard).fallback(views::method_not_allowed),
            )
            .fallback(views::not_found)
            .with_state(self.state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |request: &Request<Body>| {
                            let request_id = request
                                .headers()
                                .get("x-request-id")
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("-");
                            request_span(request_id, request.method().as_str(), request.uri().path())
                        },
                    ))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Serves the application on `addr` until Ctrl-C.
    ///
    /// Also runs the expired-session sweeper for as long as the server runs.
    pub async fn run(self, addr: &str) -> TurnstileResult<()> {
        let sweeper = spawn_session_sweeper(
            self.state.sessions.sessions().clone(),
            SESSION_SWEEP_INTERVAL,
        );
        let router = self.into_router();

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            TurnstileError::ConfigurationError(format!("Failed to bind to {addr}: {e}"))
        })?;
        tracing::info!("Starting server at http://{addr}/");

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| TurnstileError::InternalServerError(format!("Server error: {e}")));

        sweeper.abort();
        tracing::info!("Server stopped");
        served
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl-C; shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tower::ServiceExt;
    use turnstile_auth::session::InMemorySessionBackend;
    use turnstile_auth::InMemoryCredentialStore;
    use turnstile_core::Settings;

    fn app() -> TurnstileApp {
        let settings = Settings {
            secret_key: "app-test-secret".to_string(),
            ..Settings::default()
        };
        let state = AppState::new(
            settings,
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemorySessionBackend::new()),
        )
        .unwrap();
        TurnstileApp::new(state)
    }

    async fn status_of(method: &str, path: &str) -> http::StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        app().into_router().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_routes() {
        assert_eq!(status_of("GET", "/").await, 303);
        assert_eq!(status_of("GET", "/register").await, 200);
        assert_eq!(status_of("GET", "/login").await, 200);
        assert_eq!(status_of("GET", "/dashboard").await, 303);
        assert_eq!(status_of("GET", "/logout").await, 303);
    }

    #[tokio::test]
    async fn test_unknown_path_and_method() {
        assert_eq!(status_of("GET", "/admin").await, 404);
        assert_eq!(status_of("DELETE", "/login").await, 405);
        assert_eq!(status_of("PUT", "/dashboard").await, 405);
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let request = Request::builder().uri("/login").body(Body::empty()).unwrap();
        let response = app().into_router().oneshot(request).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn test_state_accessor() {
        let app = app();
        assert_eq!(app.state().settings.secret_key, "app-test-secret");
    }
}
