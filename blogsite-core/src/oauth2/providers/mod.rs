//! `OAuth2` provider implementations
//!
//! Each provider module holds its adapter struct and a factory function for
//! registration. The request/response plumbing they share lives here.

pub mod gitee;
pub mod github;
pub mod google;

pub use gitee::{gitee_factory, GiteeProvider};
pub use github::{github_factory, GitHubProvider};
pub use google::{google_factory, GoogleProvider};

use oauth2::{basic::BasicClient, AuthUrl, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope};
use reqwest::{header::ACCEPT, Client, RequestBuilder};
use serde_json::Value;
use tracing::warn;
use url::Url;

use super::client::OAuthHttpClient;
use super::token::{self, TokenSet};
use super::ExternalIdentity;
use crate::models::{ProviderConfig, ProviderKind};
use crate::{Error, Result};

/// Endpoint URLs of one provider
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorize: Url,
    pub token: Url,
    pub user_info: Url,
}

impl ProviderEndpoints {
    pub fn new(authorize: &str, token: &str, user_info: &str) -> Result<Self> {
        let parse = |s: &str| {
            Url::parse(s).map_err(|e| Error::InvalidInput(format!("Invalid provider endpoint '{s}': {e}")))
        };
        Ok(Self {
            authorize: parse(authorize)?,
            token: parse(token)?,
            user_info: parse(user_info)?,
        })
    }

    /// Public endpoints of a provider
    pub fn default_for(kind: ProviderKind) -> Result<Self> {
        match kind {
            ProviderKind::Gitee => Self::new(
                "https://gitee.com/oauth/authorize",
                "https://gitee.com/oauth/token",
                "https://gitee.com/api/v5/user",
            ),
            ProviderKind::GitHub => Self::new(
                "https://github.com/login/oauth/authorize",
                "https://github.com/login/oauth/access_token",
                "https://api.github.com/user",
            ),
            ProviderKind::Google => Self::new(
                "https://accounts.google.com/o/oauth2/auth",
                "https://oauth2.googleapis.com/token",
                "https://www.googleapis.com/oauth2/v3/userinfo",
            ),
        }
    }

    /// The provider's endpoint paths mounted under another origin (mock servers, gateways)
    pub fn rooted_at(base: &str, kind: ProviderKind) -> Result<Self> {
        let base = base.trim_end_matches('/');
        let (authorize, token, user_info) = match kind {
            ProviderKind::Gitee => ("/oauth/authorize", "/oauth/token", "/api/v5/user"),
            ProviderKind::GitHub => ("/login/oauth/authorize", "/login/oauth/access_token", "/user"),
            ProviderKind::Google => ("/o/oauth2/auth", "/token", "/oauth2/v3/userinfo"),
        };
        Self::new(
            &format!("{base}{authorize}"),
            &format!("{base}{token}"),
            &format!("{base}{user_info}"),
        )
    }
}

/// Profile keys a provider uses for the canonical fields
pub(crate) struct ProfileFields {
    pub id: &'static str,
    /// Tried in order; the first non-blank string wins
    pub names: &'static [&'static str],
    pub avatar: &'static str,
    pub email: &'static str,
}

/// Configuration and transport shared by every adapter
#[derive(Debug, Clone)]
pub(crate) struct ProviderCore {
    code: String,
    display_name: String,
    client_id: ClientId,
    client_secret: ClientSecret,
    callback_url: RedirectUrl,
    endpoints: ProviderEndpoints,
    http: OAuthHttpClient,
}

impl ProviderCore {
    pub(crate) fn new(
        kind: ProviderKind,
        config: &ProviderConfig,
        http: OAuthHttpClient,
        endpoints: ProviderEndpoints,
    ) -> Result<Self> {
        let callback_url = RedirectUrl::new(config.callback_url.clone()).map_err(|e| {
            Error::InvalidInput(format!("Invalid callback URL for {}: {e}", config.code))
        })?;
        let display_name = if config.display_name.trim().is_empty() {
            kind.default_display_name().to_string()
        } else {
            config.display_name.clone()
        };

        Ok(Self {
            code: config.code.clone(),
            display_name,
            client_id: ClientId::new(config.client_id.clone()),
            client_secret: config.client_secret.clone(),
            callback_url,
            endpoints,
            http,
        })
    }

    pub(crate) fn code(&self) -> &str {
        &self.code
    }

    pub(crate) fn display_name(&self) -> &str {
        &self.display_name
    }

    pub(crate) const fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    pub(crate) fn authorization_url(
        &self,
        return_path: &str,
        scopes: &[&str],
        extra_params: &[(&str, &str)],
    ) -> String {
        let client = BasicClient::new(self.client_id.clone())
            .set_auth_uri(AuthUrl::from_url(self.endpoints.authorize.clone()))
            .set_redirect_uri(self.callback_url.clone());

        let mut request = client
            .authorize_url(|| CsrfToken::new(return_path.to_string()))
            .add_scopes(scopes.iter().map(|s| Scope::new((*s).to_string())));
        for (name, value) in extra_params {
            request = request.add_extra_param(*name, *value);
        }

        let (url, _state) = request.url();
        url.into()
    }

    /// POST the authorization code to the token endpoint
    pub(crate) async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.secret().as_str()),
            ("redirect_uri", self.callback_url.as_str()),
        ];

        let response = self
            .http
            .send(&self.code, |c| {
                c.post(self.endpoints.token.clone())
                    .header(ACCEPT, "application/json")
                    .form(&form[..])
            })
            .await
            .map_err(|e| {
                warn!(provider = %self.code, error = %e, "Token endpoint unreachable");
                Error::token_exchange(&self.code, transport_message(&e))
            })?;

        token::read_token_response(&self.code, response).await
    }

    pub(crate) async fn refresh_access_token(&self, refresh_token: &oauth2::RefreshToken) -> Result<oauth2::AccessToken> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.secret().as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.secret().as_str()),
        ];

        let response = self
            .http
            .send(&self.code, |c| {
                c.post(self.endpoints.token.clone())
                    .header(ACCEPT, "application/json")
                    .form(&form[..])
            })
            .await
            .map_err(|e| Error::token_exchange(&self.code, transport_message(&e)))?;

        Ok(token::read_token_response(&self.code, response).await?.access_token)
    }

    /// GET the user-info endpoint and parse the JSON object it returns
    pub(crate) async fn fetch_profile<F>(&self, build: F) -> Result<(Value, String)>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.http.send(&self.code, build).await.map_err(|e| {
            warn!(provider = %self.code, error = %e, "User-info endpoint unreachable");
            Error::profile_fetch(&self.code, transport_message(&e))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::profile_fetch(&self.code, format!("failed to read profile: {e}")))?;

        if !status.is_success() {
            warn!(provider = %self.code, %status, body = %body, "User-info endpoint returned an error status");
            return Err(Error::profile_fetch(&self.code, format!("user-info endpoint returned {status}")));
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(value) if value.is_object() => Ok((value, body)),
            _ => {
                warn!(provider = %self.code, body = %body, "Unparsable user-info response");
                Err(Error::profile_fetch(&self.code, "unparsable profile response"))
            }
        }
    }

    /// Map a user-info object into the canonical identity
    pub(crate) fn map_identity(
        &self,
        fields: &ProfileFields,
        profile: &Value,
        raw_profile: String,
        tokens: &TokenSet,
    ) -> Result<ExternalIdentity> {
        let external_id = profile
            .get(fields.id)
            .and_then(scalar_to_string)
            .filter(|id| !id.is_empty());

        let name_keys_present = fields.names.iter().any(|key| profile.get(*key).is_some());
        let display_name = fields
            .names
            .iter()
            .filter_map(|key| profile.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|name| !name.is_empty())
            .unwrap_or_default()
            .to_string();

        let mut missing = Vec::new();
        if external_id.is_none() {
            missing.push(fields.id);
        }
        if !name_keys_present {
            missing.push(fields.names.first().copied().unwrap_or("name"));
        }
        let Some(external_id) = external_id.filter(|_| missing.is_empty()) else {
            warn!(provider = %self.code, body = %raw_profile, missing = ?missing, "Profile lacks identity fields");
            return Err(Error::MissingIdentityFields {
                provider: self.code.clone(),
                missing: missing.join(", "),
            });
        };

        let avatar_url = profile
            .get(fields.avatar)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let email = profile
            .get(fields.email)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        Ok(ExternalIdentity {
            provider_code: self.code.clone(),
            external_id,
            display_name,
            avatar_url,
            email,
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            raw_profile,
        })
    }
}

/// Numeric ids are stringified
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn transport_message(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "provider request timed out".to_string()
    } else if err.is_connect() {
        "could not connect to provider".to_string()
    } else {
        "provider request failed".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2::client::HttpClientSettings;

    fn core(kind: ProviderKind) -> ProviderCore {
        let config = ProviderConfig::new(
            kind.as_str(),
            "",
            "client-id",
            "client-secret",
            "https://blog.example.com/oauth/authorize/?oauth_app=github",
            true,
        );
        let http = OAuthHttpClient::new(&HttpClientSettings::default()).unwrap();
        ProviderCore::new(kind, &config, http, ProviderEndpoints::default_for(kind).unwrap()).unwrap()
    }

    const GITHUB_FIELDS: ProfileFields = ProfileFields {
        id: "id",
        names: &["name", "login"],
        avatar: "avatar_url",
        email: "email",
    };

    #[test]
    fn test_numeric_id_stringified_and_login_fallback() {
        let core = core(ProviderKind::GitHub);
        let profile = serde_json::json!({"id": 42, "name": null, "login": "ann", "email": null});
        let identity = core
            .map_identity(&GITHUB_FIELDS, &profile, profile.to_string(), &TokenSet::new("t", None))
            .unwrap();
        assert_eq!(identity.external_id, "42");
        assert_eq!(identity.display_name, "ann");
        assert!(identity.email.is_none());
        assert_eq!(identity.avatar_url, "");
    }

    #[test]
    fn test_blank_name_is_empty_not_missing() {
        let core = core(ProviderKind::Gitee);
        let fields = ProfileFields {
            id: "id",
            names: &["name"],
            avatar: "avatar_url",
            email: "email",
        };
        let profile = serde_json::json!({"id": "7", "name": "  "});
        let identity = core
            .map_identity(&fields, &profile, profile.to_string(), &TokenSet::new("t", None))
            .unwrap();
        assert_eq!(identity.display_name, "");
    }

    #[test]
    fn test_missing_id_or_names() {
        let core = core(ProviderKind::GitHub);
        let tokens = TokenSet::new("t", None);
        let no_id = serde_json::json!({"name": "Ann"});
        let err = core
            .map_identity(&GITHUB_FIELDS, &no_id, no_id.to_string(), &tokens)
            .unwrap_err();
        assert!(matches!(err, Error::MissingIdentityFields { ref missing, .. } if missing == "id"));

        let no_names = serde_json::json!({"id": 1});
        let err = core
            .map_identity(&GITHUB_FIELDS, &no_names, no_names.to_string(), &tokens)
            .unwrap_err();
        assert!(matches!(err, Error::MissingIdentityFields { .. }));
    }

    #[test]
    fn test_default_display_name_from_kind() {
        assert_eq!(core(ProviderKind::Google).display_name(), "谷歌");
    }

    #[test]
    fn test_rooted_endpoints() {
        let endpoints = ProviderEndpoints::rooted_at("http://127.0.0.1:9999/", ProviderKind::GitHub).unwrap();
        assert_eq!(endpoints.token.as_str(), "http://127.0.0.1:9999/login/oauth/access_token");
        assert_eq!(endpoints.user_info.path(), "/user");
    }
}
