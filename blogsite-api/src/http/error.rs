// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert blogsite_core errors to HTTP errors
///
/// Provider responses stay in the logs; clients only see a generic message.
impl From<blogsite_core::Error> for AppError {
    fn from(err: blogsite_core::Error) -> Self {
        use blogsite_core::Error;

        match err {
            Error::NotFound(msg) => Self::not_found(msg),
            Error::ProviderNotConfigured(code) => {
                tracing::debug!(provider = %code, "Unknown OAuth2 provider requested");
                Self::not_found("Not found")
            }
            Error::AlreadyExists(msg) => Self::conflict(msg),
            Error::InvalidInput(msg) => Self::bad_request(msg),
            Error::Authentication(msg) => Self::unauthorized(msg),
            Error::InvalidConfirmationToken => Self::forbidden("Invalid confirmation link"),
            e @ (Error::TokenExchange { .. }
            | Error::ProfileFetch { .. }
            | Error::MissingIdentityFields { .. }
            | Error::DuplicateAccountRace) => {
                tracing::warn!("OAuth2 authorization failed: {}", e);
                Self::bad_gateway("Authorization failed, please retry")
            }
            Error::Database(e) => {
                tracing::error!("Database error: {}", e);
                Self::internal_server_error("Database error")
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                Self::internal_server_error("Data processing error")
            }
            Error::Email(msg) => {
                tracing::error!("Email error: {}", msg);
                Self::internal_server_error("Internal server error")
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                Self::internal_server_error("Internal server error")
            }
        }
    }
}

/// Convert anyhow errors to HTTP errors
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {}", err);
        Self::internal_server_error("Internal server error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blogsite_core::Error;

    #[test]
    fn test_core_error_status_mapping() {
        let cases = [
            (Error::ProviderNotConfigured("weibo".to_string()), StatusCode::NOT_FOUND),
            (Error::InvalidConfirmationToken, StatusCode::FORBIDDEN),
            (Error::InvalidInput("email".to_string()), StatusCode::BAD_REQUEST),
            (Error::DuplicateAccountRace, StatusCode::BAD_GATEWAY),
            (Error::Internal("boom".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn test_provider_details_are_not_exposed() {
        let err = AppError::from(Error::TokenExchange {
            provider: "github".to_string(),
            message: "raw body: bad_verification_code".to_string(),
        });
        assert!(!err.message.contains("bad_verification_code"));
    }
}
