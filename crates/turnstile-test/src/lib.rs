//! # turnstile-test
//!
//! An HTTP test client for axum routers.
//!
//! [`TestClient`] sends requests through the router with
//! `tower::ServiceExt::oneshot`, without opening a socket, and keeps a cookie
//! jar between requests the way a browser would: `Set-Cookie` headers are
//! stored, cookies set with `Max-Age=0` are dropped.
//!
//! ```rust,no_run
//! use axum::routing::get;
//! use axum::Router;
//! use turnstile_test::TestClient;
//!
//! async fn example() {
//!     let app = Router::new().route("/hello", get(|| async { "Hello, World!" }));
//!     let mut client = TestClient::new(app);
//!
//!     let response = client.get("/hello").await;
//!     assert_eq!(response.status_code(), 200);
//!     assert_eq!(response.text(), "Hello, World!");
//! }
//! ```

use std::collections::HashMap;

use axum::body::Body;
use axum::Router;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tower::ServiceExt;

/// Characters left unescaped in form-encoded bodies.
const FORM_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'*');

/// A test client for making simulated HTTP requests against an axum router.
pub struct TestClient {
    app: Router,
    cookies: HashMap<String, String>,
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

impl TestClient {
    /// Creates a new test client wrapping the given router.
    pub fn new(app: Router) -> Self {
        Self {
            app,
            cookies: HashMap::new(),
        }
    }

    /// Sends a GET request to the given path.
    pub async fn get(&mut self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None).await
    }

    /// Sends a POST request with URL-encoded form data.
    pub async fn post(&mut self, path: &str, data: &[(&str, &str)]) -> TestResponse {
        let body = encode_form_data(data);
        self.request(
            Method::POST,
            path,
            Some((body.into_bytes(), "application/x-www-form-urlencoded")),
        )
        .await
    }

    /// Sends a request with an arbitrary method and no body.
    pub async fn send_method(&mut self, method: Method, path: &str) -> TestResponse {
        self.request(method, path, None).await
    }

    /// Returns the value of a cookie held in the jar.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Sets a cookie that will be included in subsequent requests.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    /// Removes a cookie from the jar.
    pub fn remove_cookie(&mut self, name: &str) {
        self.cookies.remove(name);
    }

    /// Clears all cookies from the client.
    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
    }

    /// Builds the Cookie header from the current cookie jar.
    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<(Vec<u8>, &str)>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);

        if let Some(cookie) = self.cookie_header() {
            builder = builder.header(http::header::COOKIE, cookie);
        }

        let body = match body {
            Some((bytes, content_type)) => {
                builder = builder.header(http::header::CONTENT_TYPE, content_type);
                Body::from(bytes)
            }
            None => Body::empty(),
        };

        let req = builder.body(body).expect("request builder should not fail");
        self.send(req).await
    }

    /// Sends the request through the router and builds a `TestResponse`.
    async fn send(&mut self, req: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(req)
            .await
            .expect("router should not error");

        let status = response.status();
        let headers = response.headers().clone();

        let mut response_cookies = HashMap::new();
        for value in headers.get_all(http::header::SET_COOKIE) {
            let Ok(cookie_str) = value.to_str() else {
                continue;
            };
            let mut attributes = cookie_str.split(';');
            let Some((name, val)) = attributes.next().and_then(|pair| pair.split_once('=')) else {
                continue;
            };
            let (name, val) = (name.trim().to_string(), val.trim().to_string());
            let expired = attributes.any(|attr| attr.trim().eq_ignore_ascii_case("max-age=0"));
            if expired {
                self.cookies.remove(&name);
            } else {
                self.cookies.insert(name.clone(), val.clone());
            }
            response_cookies.insert(name, val);
        }

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .map_or_else(|_| Bytes::new(), http_body_util::Collected::to_bytes);

        TestResponse {
            status,
            headers,
            body: body_bytes.to_vec(),
            cookies: response_cookies,
        }
    }
}

/// Encodes pairs as an `application/x-www-form-urlencoded` body.
pub fn encode_form_data(data: &[(&str, &str)]) -> String {
    data.iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, FORM_ENCODE_SET),
                utf8_percent_encode(v, FORM_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// The response from a test request.
#[derive(Debug)]
pub struct TestResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body as raw bytes.
    pub body: Vec<u8>,
    /// Cookies set by the response, expired ones included.
    pub cookies: HashMap<String, String>,
}

impl TestResponse {
    /// Returns the response body as a UTF-8 string.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Returns the numeric status code.
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns the value of a header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns every `Set-Cookie` header verbatim.
    pub fn set_cookie_headers(&self) -> Vec<&str> {
        self.headers
            .get_all(http::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Returns the redirect target, if any.
    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    /// Returns `true` if the response body contains the given text.
    pub fn contains(&self, text: &str) -> bool {
        self.text().contains(text)
    }
}
