//! Input validation for user-supplied emails and post-login return paths

use std::sync::LazyLock;

/// Maximum email length (RFC 5321)
pub const EMAIL_MAX: usize = 254;

/// Where a successful login lands when no usable return path was given
pub const DEFAULT_RETURN_PATH: &str = "/profile/";

/// Login page; never used as a post-login destination
pub const LOGIN_PATH: &str = "/login/";

/// Validation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid {field}: {message}")]
    Field { field: String, message: String },
}

/// Validation result
pub type ValidationResult<T> = Result<T, ValidationError>;

impl From<ValidationError> for crate::Error {
    fn from(err: ValidationError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

static EMAIL_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email validation regex is a compile-time constant and always valid")
});

/// Email validator
#[derive(Debug, Default)]
pub struct EmailValidator {}

impl EmailValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, email: &str) -> ValidationResult<()> {
        let field_error = |message: &str| ValidationError::Field {
            field: "email".to_string(),
            message: message.to_string(),
        };

        if email.is_empty() {
            return Err(field_error("must not be empty"));
        }
        if email.len() > EMAIL_MAX {
            return Err(field_error("too long (max 254 characters)"));
        }
        if !EMAIL_REGEX.is_match(email) {
            return Err(field_error("must be a valid email address"));
        }
        let domain = email.rsplit('@').next().unwrap_or_default();
        if domain.starts_with('.') || domain.contains("..") {
            return Err(field_error("must be a valid email address"));
        }

        Ok(())
    }

    /// Trim, lowercase and validate
    pub fn normalize(&self, email: &str) -> ValidationResult<String> {
        let normalized = email.trim().to_lowercase();
        self.validate(&normalized)?;
        Ok(normalized)
    }
}

/// Resolve the post-login destination.
///
/// Only site-relative paths are honoured. Empty input, the login page and
/// anything that could leave the site (`//host`, `http://...`, backslashes)
/// fall back to [`DEFAULT_RETURN_PATH`].
#[must_use]
pub fn sanitize_return_path(next: Option<&str>) -> String {
    let Some(path) = next.map(str::trim).filter(|p| !p.is_empty()) else {
        return DEFAULT_RETURN_PATH.to_string();
    };

    let is_relative = path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control);
    let is_login = path == LOGIN_PATH || path.split(['?', '#']).next() == Some(LOGIN_PATH);

    if is_relative && !is_login {
        path.to_string()
    } else {
        DEFAULT_RETURN_PATH.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_valid() {
        let validator = EmailValidator::new();
        assert!(validator.validate("test@example.com").is_ok());
        assert!(validator.validate("user.name+tag@domain.co.uk").is_ok());
    }

    #[test]
    fn test_email_invalid() {
        let validator = EmailValidator::new();
        assert!(validator.validate("").is_err());
        assert!(validator.validate("invalid").is_err());
        assert!(validator.validate("@example.com").is_err());
        assert!(validator.validate("test@").is_err());
        assert!(validator.validate("test@.com").is_err());
        assert!(validator.validate("a@b@c.com").is_err());
        assert!(validator.validate(&format!("{}@x.com", "a".repeat(260))).is_err());
    }

    #[test]
    fn test_email_normalize() {
        let validator = EmailValidator::new();
        assert_eq!(validator.normalize("  New@X.com ").unwrap(), "new@x.com");
        assert!(validator.normalize("   ").is_err());
    }

    #[test]
    fn test_return_path_defaults() {
        assert_eq!(sanitize_return_path(None), "/profile/");
        assert_eq!(sanitize_return_path(Some("")), "/profile/");
        assert_eq!(sanitize_return_path(Some("/login/")), "/profile/");
        assert_eq!(sanitize_return_path(Some("/login/?next=/x/")), "/profile/");
    }

    #[test]
    fn test_return_path_rejects_offsite() {
        assert_eq!(sanitize_return_path(Some("//evil.com/")), "/profile/");
        assert_eq!(sanitize_return_path(Some("https://evil.com/")), "/profile/");
        assert_eq!(sanitize_return_path(Some("/\\evil.com")), "/profile/");
        assert_eq!(sanitize_return_path(Some("article/1")), "/profile/");
    }

    #[test]
    fn test_return_path_keeps_relative() {
        assert_eq!(sanitize_return_path(Some("/article/1/?c=2")), "/article/1/?c=2");
    }
}
