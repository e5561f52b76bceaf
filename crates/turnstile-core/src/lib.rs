//! # turnstile-core
//!
//! Core types, settings, signing and error types for turnstile.
//! This crate has no web dependencies and provides the foundation for all other crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types, field-level form errors and result aliases
//! - [`settings`] - Application settings with sensible defaults
//! - [`settings_loader`] - Loading settings from TOML/JSON files and the environment
//! - [`signing`] - HMAC-SHA256 signing of cookie values
//! - [`checks`] - System checks run before serving
//! - [`logging`] - Tracing-based logging integration

pub mod checks;
pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;
pub mod signing;

// Re-export the most commonly used types at the crate root.
pub use error::{FieldErrors, TurnstileError, TurnstileResult, NON_FIELD_ERRORS};
pub use settings::Settings;
