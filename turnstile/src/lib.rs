//! # turnstile
//!
//! Registration, login, dashboard and logout pages on axum.
//!
//! This crate re-exports the workspace crates and provides the management
//! commands behind the `turnstile` binary.

#![allow(clippy::unused_async)]

pub mod command;
pub mod commands;

/// Errors, settings, signing, system checks and logging.
pub use turnstile_core as core;

/// Credential stores, form validation and the session controller.
pub use turnstile_auth as auth;

/// The router, pages and HTTP server.
pub use turnstile_web as web;

pub use command::{load_settings, CommandRegistry, ManagementCommand};
