//! Password strength validation.
//!
//! [`PasswordPolicy`] bundles the validators enabled in
//! [`PasswordValidationSettings`] and runs them against a candidate password
//! and the other values the user entered (username, email).
//!
//! # Validators
//!
//! - [`MinimumLengthValidator`] - Enforces minimum password length
//! - [`CommonPasswordValidator`] - Rejects common passwords
//! - [`NumericPasswordValidator`] - Rejects all-numeric passwords
//! - [`UserAttributeSimilarityValidator`] - Rejects passwords similar to user attributes

use turnstile_core::settings::PasswordValidationSettings;

/// Attributes shorter than this only take part in the LCS ratio, not in the
/// containment shortcut.
const MIN_CONTAINED_ATTRIBUTE_LENGTH: usize = 3;

/// Only this many leading characters of a password are compared against user
/// attributes.
const MAX_SIMILARITY_PASSWORD_LENGTH: usize = 4096;

/// Trait for password validators.
pub trait PasswordValidator: Send + Sync {
    /// Validates a password, returning an error message if it fails.
    ///
    /// `user_attributes` holds the other values of the account being
    /// created (username, email).
    fn validate(&self, password: &str, user_attributes: &[&str]) -> Result<(), String>;

    /// Returns a description of this validator's requirements.
    fn help_text(&self) -> String;
}

/// Validates that a password meets a minimum length requirement.
#[derive(Debug, Clone)]
pub struct MinimumLengthValidator {
    /// The minimum allowed password length, in characters.
    pub min_length: usize,
}

impl Default for MinimumLengthValidator {
    fn default() -> Self {
        Self { min_length: 8 }
    }
}

impl PasswordValidator for MinimumLengthValidator {
    fn validate(&self, password: &str, _user_attributes: &[&str]) -> Result<(), String> {
        if password.chars().count() < self.min_length {
            Err(format!(
                "This password is too short. It must contain at least {} characters.",
                self.min_length
            ))
        } else {
            Ok(())
        }
    }

    fn help_text(&self) -> String {
        format!(
            "Your password must contain at least {} characters.",
            self.min_length
        )
    }
}

/// Validates that a password is not in a list of common passwords.
#[derive(Debug, Clone)]
pub struct CommonPasswordValidator {
    /// The set of common passwords to reject, lower-case.
    pub common_passwords: Vec<String>,
}

impl Default for CommonPasswordValidator {
    fn default() -> Self {
        Self {
            common_passwords: [
                "password", "123456", "12345678", "1234", "qwerty", "12345",
                "dragon", "baseball", "football", "letmein", "monkey",
                "696969", "abc123", "mustang", "michael", "shadow", "master",
                "jennifer", "111111", "2000", "jordan", "superman", "harley",
                "1234567", "hunter", "trustno1", "ranger", "buster", "thomas",
                "tigger", "robert", "soccer", "batman", "test", "pass",
                "killer", "hockey", "george", "charlie", "andrew", "michelle",
                "love", "sunshine", "jessica", "pepper", "daniel", "access",
                "123456789", "654321", "joshua", "maggie", "starwars", "silver",
                "william", "dallas", "yankees", "123123", "ashley", "666666",
                "hello", "amanda", "orange", "freedom", "computer", "thunder",
                "nicole", "ginger", "heather", "hammer", "summer", "corvette",
                "taylor", "austin", "1111", "merlin", "matthew", "121212",
                "golfer", "cheese", "princess", "martin", "chelsea", "patrick",
                "richard", "diamond", "yellow", "bigdog", "secret", "asdfgh",
                "sparky", "cowboy", "iloveyou", "admin", "password1",
                "qwertyuiop", "1q2w3e4r", "passw0rd", "welcome", "whatever",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl PasswordValidator for CommonPasswordValidator {
    fn validate(&self, password: &str, _user_attributes: &[&str]) -> Result<(), String> {
        let lower = password.trim().to_lowercase();
        if self.common_passwords.iter().any(|p| p == &lower) {
            Err("This password is too common.".to_string())
        } else {
            Ok(())
        }
    }

    fn help_text(&self) -> String {
        "Your password can't be a commonly used password.".to_string()
    }
}

/// Validates that a password is not entirely numeric.
#[derive(Debug, Clone, Default)]
pub struct NumericPasswordValidator;

impl PasswordValidator for NumericPasswordValidator {
    fn validate(&self, password: &str, _user_attributes: &[&str]) -> Result<(), String> {
        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            Err("This password is entirely numeric.".to_string())
        } else {
            Ok(())
        }
    }

    fn help_text(&self) -> String {
        "Your password can't be entirely numeric.".to_string()
    }
}

/// Validates that a password is not too similar to user attributes.
///
/// The email is compared both whole and by its local part.
#[derive(Debug, Clone)]
pub struct UserAttributeSimilarityValidator {
    /// The maximum allowed similarity ratio (0.0 to 1.0). Default: 0.7.
    pub max_similarity: f64,
}

impl Default for UserAttributeSimilarityValidator {
    fn default() -> Self {
        Self {
            max_similarity: 0.7,
        }
    }
}

impl PasswordValidator for UserAttributeSimilarityValidator {
    fn validate(&self, password: &str, user_attributes: &[&str]) -> Result<(), String> {
        let password_lower: String = password
            .chars()
            .take(MAX_SIMILARITY_PASSWORD_LENGTH)
            .collect::<String>()
            .to_lowercase();
        let candidates = user_attributes.iter().flat_map(|attr| {
            let local = attr.split_once('@').map(|(local, _)| local);
            std::iter::once(*attr).chain(local)
        });
        for attr in candidates {
            if attr.is_empty() {
                continue;
            }
            let attr_lower = attr.to_lowercase();
            if exceeds_maximum_length_ratio(&password_lower, self.max_similarity, &attr_lower) {
                continue;
            }
            if compute_similarity(&password_lower, &attr_lower) >= self.max_similarity {
                return Err("The password is too similar to your personal information.".to_string());
            }
        }
        Ok(())
    }

    fn help_text(&self) -> String {
        "Your password can't be too similar to your other personal information.".to_string()
    }
}

/// Returns `true` when the password is so much longer than `value` that their
/// similarity cannot reach `max_similarity`.
#[allow(clippy::cast_precision_loss)]
fn exceeds_maximum_length_ratio(password: &str, max_similarity: f64, value: &str) -> bool {
    let password_len = password.chars().count();
    let value_len = value.chars().count();
    let length_bound_similarity = max_similarity / 2.0 * password_len as f64;
    password_len >= 10 * value_len && (value_len as f64) < length_bound_similarity
}

/// Computes a similarity ratio between two strings.
///
/// Returns a value between 0.0 (completely different) and 1.0 (identical).
/// One string containing the other counts as identical; otherwise the ratio
/// is twice the longest common subsequence over the combined length.
fn compute_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    if m + n == 0 {
        return 1.0;
    }

    let (shorter, longer) = if m <= n { (&a, &b) } else { (&b, &a) };
    if shorter.len() >= MIN_CONTAINED_ATTRIBUTE_LENGTH
        && longer.windows(shorter.len()).any(|w| w == shorter.as_slice())
    {
        return 1.0;
    }

    // Two-row LCS table.
    let mut prev = vec![0usize; n + 1];
    let mut curr = vec![0usize; n + 1];
    for i in 1..=m {
        for j in 1..=n {
            curr[j] = if a[i - 1] == b[j - 1] {
                prev[j - 1] + 1
            } else {
                curr[j - 1].max(prev[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
        curr.fill(0);
    }

    #[allow(clippy::cast_precision_loss)]
    let similarity = (2.0 * prev[n] as f64) / (m + n) as f64;
    similarity
}

/// The set of validators applied to new passwords.
pub struct PasswordPolicy {
    validators: Vec<Box<dyn PasswordValidator>>,
}

impl std::fmt::Debug for PasswordPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordPolicy")
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl PasswordPolicy {
    /// Creates a policy from an explicit list of validators.
    pub fn new(validators: Vec<Box<dyn PasswordValidator>>) -> Self {
        Self { validators }
    }

    /// Creates the policy described by the settings.
    pub fn from_settings(settings: &PasswordValidationSettings) -> Self {
        let mut validators: Vec<Box<dyn PasswordValidator>> = Vec::new();
        if settings.reject_similar {
            validators.push(Box::new(UserAttributeSimilarityValidator::default()));
        }
        validators.push(Box::new(MinimumLengthValidator {
            min_length: settings.min_length,
        }));
        if settings.reject_common {
            validators.push(Box::new(CommonPasswordValidator::default()));
        }
        if settings.reject_numeric {
            validators.push(Box::new(NumericPasswordValidator));
        }
        Self::new(validators)
    }

    /// Runs every validator and collects all failure messages.
    pub fn validate(&self, password: &str, user_attributes: &[&str]) -> Result<(), Vec<String>> {
        let errors: Vec<String> = self
            .validators
            .iter()
            .filter_map(|v| v.validate(password, user_attributes).err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns the help texts of every validator, for display next to the
    /// password field.
    pub fn help_texts(&self) -> Vec<String> {
        self.validators.iter().map(|v| v.help_text()).collect()
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::from_settings(&PasswordValidationSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_length_validator() {
        let v = MinimumLengthValidator::default();
        assert!(v.validate("12345678", &[]).is_ok());
        let err = v.validate("short", &[]).unwrap_err();
        assert!(err.contains("at least 8 characters"));
        // Counted in characters, not bytes.
        assert!(v.validate("ééééééé", &[]).is_err());
    }

    #[test]
    fn test_common_password_validator() {
        let v = CommonPasswordValidator::default();
        assert!(v.validate("password", &[]).is_err());
        assert!(v.validate("PassWord", &[]).is_err());
        assert!(v.validate("correct-horse-battery", &[]).is_ok());
    }

    #[test]
    fn test_numeric_validator() {
        let v = NumericPasswordValidator;
        assert!(v.validate("8675309123", &[]).is_err());
        assert!(v.validate("86753O9123", &[]).is_ok());
    }

    #[test]
    fn test_similarity_validator() {
        let v = UserAttributeSimilarityValidator::default();
        assert!(v.validate("alice2024", &["alice", "x@example.com"]).is_err());
        assert!(v.validate("Secret123", &["alice", "alice@example.com"]).is_ok());
        // The local part of the email is compared on its own.
        assert!(v.validate("wonderland1", &["bob", "wonderland@example.com"]).is_err());
    }

    #[test]
    fn test_similarity_skips_short_attributes_of_long_passwords() {
        assert!(exceeds_maximum_length_ratio("a".repeat(100).as_str(), 0.7, "bob"));
        assert!(!exceeds_maximum_length_ratio("alice2024", 0.7, "alice"));

        let v = UserAttributeSimilarityValidator::default();
        let password = "bob".repeat(40);
        assert!(v.validate(&password, &["bob"]).is_ok());
    }

    #[test]
    fn test_similarity_bounds_long_passwords() {
        let v = UserAttributeSimilarityValidator::default();
        let password = "x".repeat(200_000);
        let email = format!("{}@example.com", "x".repeat(240));
        let started = std::time::Instant::now();
        assert!(v.validate(&password, &[&email]).is_ok());
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_compute_similarity() {
        assert!((compute_similarity("abc", "abc") - 1.0).abs() < f64::EPSILON);
        assert!(compute_similarity("abcdef", "uvwxyz") < 0.01);
        // Two-character attributes are not matched by containment alone.
        assert!(compute_similarity("secretbo", "bo") < 0.7);
    }

    #[test]
    fn test_policy_from_settings() {
        let policy = PasswordPolicy::default();
        assert_eq!(policy.help_texts().len(), 4);
        assert!(policy.validate("Secret123", &["alice", "alice@example.com"]).is_ok());

        let errors = policy.validate("1234", &["bob"]).unwrap_err();
        assert_eq!(errors.len(), 3); // too short, too common, entirely numeric
    }

    #[test]
    fn test_policy_respects_toggles() {
        let settings = PasswordValidationSettings {
            min_length: 4,
            reject_common: false,
            reject_numeric: false,
            reject_similar: false,
        };
        let policy = PasswordPolicy::from_settings(&settings);
        assert!(policy.validate("1234", &["1234"]).is_ok());
        assert!(PasswordPolicy::new(Vec::new()).validate("", &[]).is_ok());
    }
}
