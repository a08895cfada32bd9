//! Token-endpoint response parsing shared by all providers
//!
//! Providers answer with either a JSON object or an
//! `application/x-www-form-urlencoded` body depending on the `Accept`
//! header they honour, so both encodings are accepted.

use std::collections::HashMap;

use oauth2::{AccessToken, RefreshToken};
use reqwest::Response;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Tokens returned by a successful code exchange
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: AccessToken,
    pub refresh_token: Option<RefreshToken>,
}

impl TokenSet {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: AccessToken::new(access_token.into()),
            refresh_token: refresh_token.map(RefreshToken::new),
        }
    }
}

/// Read a token-endpoint response into a [`TokenSet`].
///
/// Any failure is a `TokenExchange` error; the raw body is logged, never returned.
pub(crate) async fn read_token_response(provider: &str, response: Response) -> Result<TokenSet> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::token_exchange(provider, format!("failed to read token response: {e}")))?;

    if !status.is_success() {
        warn!(provider, %status, body = %body, "Token endpoint returned an error status");
        return Err(Error::token_exchange(provider, format!("token endpoint returned {status}")));
    }

    parse_token_body(provider, &body)
}

/// Parse a token-endpoint body in either encoding
pub(crate) fn parse_token_body(provider: &str, body: &str) -> Result<TokenSet> {
    let fields = match decode_fields(body) {
        Some(fields) => fields,
        None => {
            warn!(provider, body = %body, "Unparsable token endpoint response");
            return Err(Error::token_exchange(provider, "unparsable token response"));
        }
    };

    let access_token = fields
        .get("access_token")
        .map(|t| t.trim())
        .filter(|t| !t.is_empty());

    let Some(access_token) = access_token else {
        let reason = fields
            .get("error_description")
            .or_else(|| fields.get("error"))
            .map_or("response has no access_token", String::as_str);
        warn!(provider, body = %body, reason, "Token endpoint response lacks access_token");
        return Err(Error::token_exchange(provider, "response has no access_token"));
    };

    let refresh_token = fields
        .get("refresh_token")
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    debug!(provider, has_refresh_token = refresh_token.is_some(), "Token exchange succeeded");
    Ok(TokenSet::new(access_token, refresh_token))
}

/// Flatten a JSON object or a form body into string fields
fn decode_fields(body: &str) -> Option<HashMap<String, String>> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        let object = value.as_object()?;
        return Some(
            object
                .iter()
                .filter_map(|(k, v)| {
                    let v = match v {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        _ => return None,
                    };
                    Some((k.clone(), v))
                })
                .collect(),
        );
    }

    serde_urlencoded::from_str::<Vec<(String, String)>>(trimmed)
        .ok()
        .map(|pairs| pairs.into_iter().collect())
}
