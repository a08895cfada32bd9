use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Unknown, unconfigured or disabled provider code
    #[error("OAuth2 provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// Token endpoint rejected the code or omitted the access token
    #[error("Token exchange with {provider} failed: {message}")]
    TokenExchange { provider: String, message: String },

    /// User-info endpoint failed or returned something unparsable
    #[error("Profile fetch from {provider} failed: {message}")]
    ProfileFetch { provider: String, message: String },

    /// Provider answered but withheld the fields an identity needs
    #[error("Provider {provider} did not return required field(s): {missing}")]
    MissingIdentityFields { provider: String, missing: String },

    #[error("Invalid confirmation token")]
    InvalidConfirmationToken,

    /// Concurrent account creation kept losing the uniqueness race
    #[error("Account creation raced too many times")]
    DuplicateAccountRace,
}

impl Error {
    /// Errors whose user-facing remedy is "retry the authorization".
    #[must_use]
    pub const fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            Self::TokenExchange { .. } | Self::ProfileFetch { .. } | Self::DuplicateAccountRace
        )
    }

    pub(crate) fn token_exchange(provider: &str, message: impl Into<String>) -> Self {
        Self::TokenExchange {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn profile_fetch(provider: &str, message: impl Into<String>) -> Self {
        Self::ProfileFetch {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // Map "no rows" to NotFound
            sqlx::Error::RowNotFound => Self::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                match code.as_ref() {
                    // PostgreSQL unique_violation
                    "23505" => {
                        let detail = db_err.message().to_string();
                        if detail.contains("username") {
                            Self::AlreadyExists("Username already taken".to_string())
                        } else if detail.contains("email") {
                            Self::AlreadyExists("Email already registered".to_string())
                        } else {
                            Self::AlreadyExists("Resource already exists".to_string())
                        }
                    }
                    // PostgreSQL foreign_key_violation
                    "23503" => Self::NotFound("Referenced resource not found".to_string()),
                    // PostgreSQL not_null_violation
                    "23502" => Self::InvalidInput("Required field is missing".to_string()),
                    _ => Self::Database(err),
                }
            }
            _ => Self::Database(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_failures() {
        assert!(Error::token_exchange("github", "no access_token").is_authorization_failure());
        assert!(Error::profile_fetch("gitee", "bad json").is_authorization_failure());
        assert!(Error::DuplicateAccountRace.is_authorization_failure());
        assert!(!Error::InvalidConfirmationToken.is_authorization_failure());
        assert!(!Error::MissingIdentityFields {
            provider: "google".to_string(),
            missing: "sub".to_string(),
        }
        .is_authorization_failure());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
