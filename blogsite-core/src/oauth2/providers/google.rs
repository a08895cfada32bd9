//! Google OAuth2 provider

use async_trait::async_trait;
use oauth2::{AccessToken, RefreshToken};
use reqwest::header::AUTHORIZATION;

use super::{ProfileFields, ProviderCore, ProviderEndpoints};
use crate::models::{ProviderConfig, ProviderKind};
use crate::oauth2::{ExternalIdentity, OAuthHttpClient, Provider, ProviderAdapter, TokenSet};
use crate::Result;

const SCOPES: &[&str] = &["openid", "email", "profile"];

// Offline access so Google issues a refresh token on every consent
const EXTRA_PARAMS: &[(&str, &str)] = &[
    ("access_type", "offline"),
    ("include_granted_scopes", "true"),
    ("prompt", "consent"),
];

const FIELDS: ProfileFields = ProfileFields {
    id: "sub",
    names: &["name"],
    avatar: "picture",
    email: "email",
};

/// Google OAuth2 provider
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    core: ProviderCore,
}

impl GoogleProvider {
    pub fn new(config: &ProviderConfig, http: OAuthHttpClient) -> Result<Self> {
        Self::with_endpoints(config, http, ProviderEndpoints::default_for(ProviderKind::Google)?)
    }

    pub fn with_endpoints(
        config: &ProviderConfig,
        http: OAuthHttpClient,
        endpoints: ProviderEndpoints,
    ) -> Result<Self> {
        Ok(Self {
            core: ProviderCore::new(ProviderKind::Google, config, http, endpoints)?,
        })
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn code(&self) -> &str {
        self.core.code()
    }

    fn display_name(&self) -> &str {
        self.core.display_name()
    }

    fn authorization_url(&self, return_path: &str) -> String {
        self.core.authorization_url(return_path, SCOPES, EXTRA_PARAMS)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        self.core.exchange_code(code).await
    }

    async fn refresh_access_token(&self, refresh_token: &RefreshToken) -> Result<AccessToken> {
        self.core.refresh_access_token(refresh_token).await
    }

    async fn fetch_identity(&self, tokens: &TokenSet) -> Result<ExternalIdentity> {
        let url = self.core.endpoints().user_info.clone();
        let bearer = format!("Bearer {}", tokens.access_token.secret());

        let (profile, raw) = self
            .core
            .fetch_profile(|c| c.get(url.clone()).header(AUTHORIZATION, &bearer))
            .await?;

        self.core.map_identity(&FIELDS, &profile, raw, tokens)
    }
}

/// Factory function for Google provider
pub fn google_factory(config: &ProviderConfig, http: OAuthHttpClient) -> Result<ProviderAdapter> {
    GoogleProvider::new(config, http).map(ProviderAdapter::Google)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2::HttpClientSettings;
    use crate::Error;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) -> GoogleProvider {
        let config = ProviderConfig::new(
            "google",
            "谷歌",
            "g-client",
            "g-secret",
            "https://blog.example.com/oauth/authorize/?oauth_app=google",
            true,
        );
        let http = OAuthHttpClient::new(&HttpClientSettings::default()).unwrap();
        let endpoints = ProviderEndpoints::rooted_at(&server.uri(), ProviderKind::Google).unwrap();
        GoogleProvider::with_endpoints(&config, http, endpoints).unwrap()
    }

    #[tokio::test]
    async fn test_authorization_url_requests_offline_access() {
        let server = MockServer::start().await;
        let url = url::Url::parse(&provider(&server).await.authorization_url("/profile/")).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["scope"], "openid email profile");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["include_granted_scopes"], "true");
        assert_eq!(params["prompt"], "consent");
    }

    #[tokio::test]
    async fn test_userinfo_field_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/v3/userinfo"))
            .and(header("authorization", "Bearer g-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "1094",
                "name": "Ann Lee",
                "picture": "https://lh3.googleusercontent.com/a.png",
                "email": "ann@gmail.com",
                "email_verified": true
            })))
            .mount(&server)
            .await;

        let identity = provider(&server)
            .await
            .fetch_identity(&TokenSet::new("g-token", Some("g-refresh".to_string())))
            .await
            .unwrap();
        assert_eq!(identity.external_id, "1094");
        assert_eq!(identity.avatar_url, "https://lh3.googleusercontent.com/a.png");
        assert_eq!(identity.email.as_deref(), Some("ann@gmail.com"));
        assert!(identity.raw_profile.contains("email_verified"));
    }

    #[tokio::test]
    async fn test_missing_sub() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/v3/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "x"})))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .fetch_identity(&TokenSet::new("g-token", None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingIdentityFields { .. }));
    }
}
