//! Registration and login form validation.
//!
//! - [`validate_registration`] checks a [`RegistrationForm`] against the field
//!   rules, the password policy and the credential store
//! - [`register`] validates and then creates the account
//! - [`validate_login`] checks a [`LoginForm`] and returns the matching user
//!
//! Validation never writes anything. On failure the caller re-renders the
//! form from [`RegistrationForm::retained`], which keeps the username and
//! email but never the passwords.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use turnstile_core::error::{FieldErrors, TurnstileError, TurnstileResult};

use crate::password_validation::PasswordPolicy;
use crate::store::CredentialStore;
use crate::user::{normalize_email, Extra, User, UserId};

/// Message for a missing or blank required field.
pub const REQUIRED_MESSAGE: &str = "This field is required.";

/// Message when `password2` does not repeat `password1`.
pub const PASSWORD_MISMATCH_MESSAGE: &str = "The two password fields didn't match.";

/// Message when the username is already registered.
pub const DUPLICATE_USERNAME_MESSAGE: &str = "A user with that username already exists.";

/// Message for any failed login. Identical for unknown users, wrong
/// passwords and inactive accounts.
pub const INVALID_LOGIN_MESSAGE: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

const INVALID_USERNAME_MESSAGE: &str =
    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";

const INVALID_EMAIL_MESSAGE: &str = "Enter a valid email address.";

const USERNAME_MAX_LENGTH: usize = 150;
const EMAIL_MAX_LENGTH: usize = 254;

fn username_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("valid username regex"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
    })
}

// ── RegistrationForm ────────────────────────────────────────────────

/// Submitted registration data, as decoded from the form body.
///
/// Missing fields decode as empty strings.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrationForm {
    /// The requested username.
    pub username: String,
    /// The email address.
    pub email: String,
    /// The password.
    #[serde(skip_serializing)]
    pub password1: String,
    /// The password again, for confirmation.
    #[serde(skip_serializing)]
    pub password2: String,
}

impl std::fmt::Debug for RegistrationForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationForm")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl RegistrationForm {
    /// Returns a copy holding only the values safe to re-render.
    #[must_use]
    pub fn retained(&self) -> Self {
        Self {
            username: self.username.clone(),
            email: self.email.clone(),
            password1: String::new(),
            password2: String::new(),
        }
    }
}

/// Registration data that passed every check.
#[derive(Clone)]
pub struct ValidatedRegistration {
    /// The username, stripped of surrounding whitespace.
    pub username: String,
    /// The email, with a lower-cased domain.
    pub email: String,
    /// The raw password, to be hashed by the store.
    pub password: String,
}

impl std::fmt::Debug for ValidatedRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedRegistration")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

fn clean_username(raw: &str, errors: &mut FieldErrors) -> Option<String> {
    let username = raw.trim();
    if username.is_empty() {
        errors.add("username", REQUIRED_MESSAGE);
        return None;
    }
    let length = username.chars().count();
    if length > USERNAME_MAX_LENGTH {
        errors.add(
            "username",
            format!(
                "Ensure this value has at most {USERNAME_MAX_LENGTH} characters (it has {length})."
            ),
        );
        return None;
    }
    if !username_regex().is_match(username) {
        errors.add("username", INVALID_USERNAME_MESSAGE);
        return None;
    }
    Some(username.to_string())
}

fn clean_email(raw: &str, errors: &mut FieldErrors) -> Option<String> {
    let email = raw.trim();
    if email.is_empty() {
        errors.add("email", REQUIRED_MESSAGE);
        return None;
    }
    let length = email.chars().count();
    if length > EMAIL_MAX_LENGTH {
        errors.add(
            "email",
            format!("Ensure this value has at most {EMAIL_MAX_LENGTH} characters (it has {length})."),
        );
        return None;
    }
    if !email_regex().is_match(email) {
        errors.add("email", INVALID_EMAIL_MESSAGE);
        return None;
    }
    Some(normalize_email(email))
}

/// Validates a registration submission.
///
/// Collects every field error rather than stopping at the first, so the
/// re-rendered form shows all problems at once. The username uniqueness check
/// only runs once the username itself is well-formed.
pub async fn validate_registration(
    form: &RegistrationForm,
    store: &dyn CredentialStore,
    policy: &PasswordPolicy,
) -> TurnstileResult<ValidatedRegistration> {
    let mut errors = FieldErrors::new();

    let username = clean_username(&form.username, &mut errors);
    let email = clean_email(&form.email, &mut errors);

    if form.password1.is_empty() {
        errors.add("password1", REQUIRED_MESSAGE);
    }
    if form.password2.is_empty() {
        errors.add("password2", REQUIRED_MESSAGE);
    }

    if !form.password1.is_empty() && !form.password2.is_empty() {
        if form.password1 == form.password2 {
            // Only values that passed their own validation are compared.
            let attributes: Vec<&str> = [username.as_deref(), email.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if let Err(messages) = policy.validate(&form.password1, &attributes) {
                for message in messages {
                    errors.add("password2", message);
                }
            }
        } else {
            errors.add("password2", PASSWORD_MISMATCH_MESSAGE);
        }
    }

    if let Some(ref username) = username {
        if store.username_taken(username).await? {
            errors.add("username", DUPLICATE_USERNAME_MESSAGE);
        }
    }

    match (username, email) {
        (Some(username), Some(email)) if errors.is_empty() => Ok(ValidatedRegistration {
            username,
            email,
            password: form.password1.clone(),
        }),
        _ => Err(TurnstileError::Validation(errors)),
    }
}

/// Validates a registration and creates the account.
///
/// A [`TurnstileError::Conflict`] from the store (another registration for the
/// same username won the race after validation) is reported as the same
/// username field error that validation would have produced.
pub async fn register(
    form: &RegistrationForm,
    store: &dyn CredentialStore,
    policy: &PasswordPolicy,
) -> TurnstileResult<UserId> {
    let valid = validate_registration(form, store, policy).await?;
    match store
        .create_user(&valid.username, &valid.email, &valid.password, Extra::new())
        .await
    {
        Ok(id) => {
            tracing::info!(user_id = %id, username = %valid.username, "User registered");
            Ok(id)
        }
        Err(TurnstileError::Conflict(_)) => {
            tracing::info!(username = %valid.username, "Registration lost a username race");
            Err(TurnstileError::Validation(FieldErrors::single(
                "username",
                DUPLICATE_USERNAME_MESSAGE,
            )))
        }
        Err(e) => Err(e),
    }
}

// ── LoginForm ───────────────────────────────────────────────────────

/// Submitted login data, as decoded from the form body.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    /// The username.
    pub username: String,
    /// The password.
    #[serde(skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl LoginForm {
    /// Returns a copy holding only the values safe to re-render.
    #[must_use]
    pub fn retained(&self) -> Self {
        Self {
            username: self.username.clone(),
            password: String::new(),
        }
    }
}

/// Validates a login submission and returns the authenticated user.
///
/// Missing fields yield [`TurnstileError::Validation`]. Every other failure
/// (unknown username, wrong password, inactive account) yields
/// [`TurnstileError::InvalidCredentials`] after exactly one password
/// verification.
pub async fn validate_login(form: &LoginForm, store: &dyn CredentialStore) -> TurnstileResult<User> {
    let username = form.username.trim();

    let mut errors = FieldErrors::new();
    if username.is_empty() {
        errors.add("username", REQUIRED_MESSAGE);
    }
    if form.password.is_empty() {
        errors.add("password", REQUIRED_MESSAGE);
    }
    errors.into_result()?;

    if !store.verify_password(username, &form.password).await? {
        tracing::info!(username, "Login failed");
        return Err(TurnstileError::InvalidCredentials);
    }

    match store.get_by_username(username).await? {
        Some(user) if user.is_active => Ok(user),
        _ => {
            tracing::info!(username, "Login refused for inactive account");
            Err(TurnstileError::InvalidCredentials)
        }
    }
}
