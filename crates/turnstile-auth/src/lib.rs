//! # turnstile-auth
//!
//! Accounts and sessions for turnstile: the three components behind the
//! register, login, dashboard and logout pages.
//!
//! ## Modules
//!
//! - [`store`] - The [`CredentialStore`] trait and its in-memory implementation
//! - [`sqlite`] - A SQLite-backed credential store
//! - [`forms`] - Registration and login form validation
//! - [`session`] - Server-side sessions and the Anonymous/Authenticated state machine
//! - [`hashers`] - Argon2id/bcrypt password hashing
//! - [`password_validation`] - Password strength policy
//! - [`user`] - The user record and authentication state

pub mod forms;
pub mod hashers;
pub mod password_validation;
pub mod session;
pub mod sqlite;
pub mod store;
pub mod user;

pub use forms::{register, validate_login, validate_registration, LoginForm, RegistrationForm};
pub use password_validation::PasswordPolicy;
pub use session::{
    require_login, InMemorySessionBackend, SessionBackend, SessionController,
};
pub use sqlite::SqliteCredentialStore;
pub use store::{CredentialStore, InMemoryCredentialStore};
pub use user::{AuthState, Extra, User, UserId};
