//! Cookie parsing and `Set-Cookie` header construction.

use http::HeaderMap;
use turnstile_core::Settings;

/// Lifetime of the CSRF cookie in seconds (one year).
const CSRF_COOKIE_AGE: u64 = 31_449_600;

/// Returns the value of the named cookie from the request's `Cookie` headers.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}

/// Builds the session cookie carrying a signed session key.
pub fn session_cookie(settings: &Settings, value: &str) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}",
        settings.session_cookie_name,
        value,
        settings.session_cookie_samesite,
        settings.session_cookie_age
    );
    if settings.session_cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Builds a header that makes the client drop the session cookie.
pub fn expired_session_cookie(settings: &Settings) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite={}; Max-Age=0",
        settings.session_cookie_name, settings.session_cookie_samesite
    )
}

/// Builds the CSRF cookie. It is readable by scripts, unlike the session cookie.
pub fn csrf_cookie(settings: &Settings, token: &str) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; SameSite=Lax; Max-Age={CSRF_COOKIE_AGE}",
        settings.csrf_cookie_name, token
    );
    if settings.session_cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}
