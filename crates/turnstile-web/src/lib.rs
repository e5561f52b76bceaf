//! # turnstile-web
//!
//! The HTTP surface of turnstile: four pages (register, login, dashboard and
//! logout) served by axum.
//!
//! ## Modules
//!
//! - [`app`] - The router, its middleware layers and the server loop
//! - [`views`] - Page handlers
//! - [`context`] - The per-request extractor carrying auth and CSRF state
//! - [`csrf`] - Double-submit CSRF tokens
//! - [`cookies`] - Cookie parsing and `Set-Cookie` rendering
//! - [`templates`] - Built-in Tera templates and directory overrides
//! - [`state`] - Shared application state
//! - [`error`] - Plain-text error responses for failures before a handler runs

#![allow(clippy::unused_async)]

pub mod app;
pub mod context;
pub mod cookies;
pub mod csrf;
pub mod error;
pub mod state;
pub mod templates;
pub mod views;

pub use app::TurnstileApp;
pub use context::RequestContext;
pub use state::{open_credential_store, AppState};
pub use templates::Templates;
