//! CSRF (Cross-Site Request Forgery) protection.
//!
//! Double-submit scheme: every visitor gets a random token in the `csrftoken`
//! cookie, every form embeds the same token in the `csrfmiddlewaretoken`
//! field, and every POST must present both, equal.

use turnstile_core::error::{TurnstileError, TurnstileResult};
use turnstile_core::signing::{constant_time_eq, random_hex_token};

/// The length of a CSRF token in bytes (produces 64-char hex string).
const CSRF_TOKEN_LENGTH: usize = 32;

/// The form field name used for CSRF tokens.
pub const CSRF_FORM_FIELD: &str = "csrfmiddlewaretoken";

/// Generates a random CSRF token as a 64-character hex string.
pub fn generate_csrf_token() -> String {
    random_hex_token(CSRF_TOKEN_LENGTH)
}

/// Returns `true` if `token` has the shape of a generated token.
pub fn is_well_formed(token: &str) -> bool {
    token.len() == CSRF_TOKEN_LENGTH * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Checks a submitted token against the cookie token.
pub fn check_csrf(cookie_token: Option<&str>, submitted: Option<&str>) -> TurnstileResult<()> {
    let Some(cookie_token) = cookie_token else {
        return Err(TurnstileError::CsrfFailure("CSRF cookie not set.".to_string()));
    };
    let submitted = submitted.unwrap_or_default();
    if submitted.is_empty() {
        return Err(TurnstileError::CsrfFailure("CSRF token missing.".to_string()));
    }
    if !constant_time_eq(submitted.as_bytes(), cookie_token.as_bytes()) {
        return Err(TurnstileError::CsrfFailure("CSRF token incorrect.".to_string()));
    }
    Ok(())
}
