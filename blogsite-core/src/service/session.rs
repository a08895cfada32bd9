//! Login sessions as HS256 JWTs

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::models::{Account, AccountId};
use crate::{Error, Result};

const SESSION_TYPE: &str = "session";

/// Session claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account ID
    pub sub: String,
    pub typ: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    #[must_use]
    pub fn account_id(&self) -> AccountId {
        AccountId::from_string(self.sub.clone())
    }
}

#[derive(Clone)]
pub struct SessionService {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    max_age: Duration,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl SessionService {
    #[must_use]
    pub fn new(secret: &str, config: &SessionConfig) -> Self {
        Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            max_age: Duration::seconds(i64::try_from(config.max_age_seconds).unwrap_or(i64::MAX / 1000)),
        }
    }

    /// Sign a session token for `account`
    pub fn issue(&self, account: &Account) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: account.id.as_str().to_string(),
            typ: SESSION_TYPE.to_string(),
            iat: now.timestamp(),
            exp: (now + self.max_age).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("Failed to sign session: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60;

        let token_data: TokenData<Claims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Error::Authentication("Session expired".to_string())
                }
                _ => Error::Authentication(format!("Invalid session: {e}")),
            })?;

        if token_data.claims.typ != SESSION_TYPE {
            return Err(Error::Authentication("Not a session token".to_string()));
        }
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::oauth_source;

    fn account() -> Account {
        let now = Utc::now();
        Account {
            id: AccountId::new(),
            username: "ann".to_string(),
            email: "ann@x.com".to_string(),
            is_active: true,
            source: oauth_source("github"),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let service = SessionService::new("secret", &SessionConfig::default());
        let account = account();
        let token = service.issue(&account).unwrap();

        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.account_id(), account.id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_rejects_other_secret_and_garbage() {
        let service = SessionService::new("secret", &SessionConfig::default());
        let token = service.issue(&account()).unwrap();

        let other = SessionService::new("other", &SessionConfig::default());
        assert!(matches!(other.verify(&token), Err(Error::Authentication(_))));
        assert!(service.verify("not-a-jwt").is_err());
    }
}
