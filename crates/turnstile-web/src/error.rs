//! Conversion of errors into HTTP responses outside the page handlers.

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use turnstile_core::TurnstileError;

/// A [`TurnstileError`] surfaced before a page handler runs.
///
/// Page handlers render errors through `error.html`; this type covers
/// failures that happen earlier (e.g. the session store failing during
/// request-context extraction) with a plain-text body.
#[derive(Debug)]
pub struct WebError(pub TurnstileError);

impl From<TurnstileError> for WebError {
    fn from(err: TurnstileError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = if self.0.is_client_error() {
            self.0.to_string()
        } else {
            tracing::error!(error = %self.0, "Request failed");
            "Server Error (500)".to_string()
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_hide_detail() {
        let response =
            WebError(TurnstileError::DatabaseError("disk on fire".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_client_error_status() {
        let response = WebError::from(TurnstileError::CsrfFailure("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
