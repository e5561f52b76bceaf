//! The per-request context.
//!
//! [`RequestContext`] is an axum extractor that every page handler receives.
//! It carries the resolved [`AuthState`], the presented session cookie and the
//! CSRF token, and collects the cookies the response must set. Handlers pass
//! their response through [`RequestContext::finish`] to attach them.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::response::{IntoResponse, Response};
use http::request::Parts;
use http::HeaderValue;
use turnstile_auth::{AuthState, User};
use turnstile_core::error::TurnstileResult;
use turnstile_core::Settings;

use crate::cookies;
use crate::csrf;
use crate::error::WebError;
use crate::state::AppState;

/// Request-scoped authentication and CSRF state.
#[derive(Debug)]
pub struct RequestContext {
    /// Whether the request is anonymous or authenticated.
    pub auth: AuthState,
    /// The requested path, including the query string.
    pub path: String,
    session_cookie: Option<String>,
    csrf_cookie: Option<String>,
    csrf_token: String,
    set_cookies: Vec<String>,
    settings: Arc<Settings>,
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let settings = state.settings.clone();

        let session_cookie =
            cookies::get_cookie(&parts.headers, &settings.session_cookie_name).map(str::to_string);
        let auth = state.sessions.resolve(session_cookie.as_deref()).await?;

        let csrf_cookie = cookies::get_cookie(&parts.headers, &settings.csrf_cookie_name)
            .filter(|token| csrf::is_well_formed(token))
            .map(str::to_string);
        let csrf_token = csrf_cookie
            .clone()
            .unwrap_or_else(csrf::generate_csrf_token);

        let path = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);

        Ok(Self {
            auth,
            path,
            session_cookie,
            csrf_cookie,
            csrf_token,
            set_cookies: Vec::new(),
            settings,
        })
    }
}

impl RequestContext {
    /// Returns the authenticated user, if any.
    pub const fn user(&self) -> Option<&User> {
        self.auth.user()
    }

    /// Returns the session cookie value as presented by the client.
    pub fn session_cookie(&self) -> Option<&str> {
        self.session_cookie.as_deref()
    }

    /// Returns the CSRF token to embed in forms.
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Checks the token submitted with a form against the CSRF cookie.
    pub fn verify_csrf(&self, submitted: Option<&str>) -> TurnstileResult<()> {
        csrf::check_csrf(self.csrf_cookie.as_deref(), submitted).map_err(|e| {
            tracing::warn!(path = %self.path, reason = %e, "CSRF check failed");
            e
        })
    }

    /// Replaces the CSRF token; the new one is sent with the response.
    pub fn rotate_csrf_token(&mut self) {
        self.csrf_token = csrf::generate_csrf_token();
    }

    /// Sets the session cookie on the response.
    pub fn set_session(&mut self, signed_key: &str) {
        self.session_cookie = Some(signed_key.to_string());
        self.set_cookies
            .push(cookies::session_cookie(&self.settings, signed_key));
    }

    /// Removes the session cookie from the client.
    pub fn clear_session(&mut self) {
        self.session_cookie = None;
        self.auth = AuthState::Anonymous;
        self.set_cookies
            .push(cookies::expired_session_cookie(&self.settings));
    }

    /// Attaches the pending cookies to `response`.
    ///
    /// The CSRF cookie is (re)sent whenever the client does not already hold
    /// the current token.
    pub fn finish(self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        let mut pending = self.set_cookies;
        if self.csrf_cookie.as_deref() != Some(self.csrf_token.as_str()) {
            pending.push(cookies::csrf_cookie(&self.settings, &self.csrf_token));
        }

        let headers = response.headers_mut();
        for cookie in pending {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    headers.append(http::header::SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(error = %e, "Dropping malformed Set-Cookie header"),
            }
        }
        response
    }
}
