//! GitHub OAuth2 provider

use async_trait::async_trait;
use oauth2::{AccessToken, RefreshToken};
use reqwest::header::{ACCEPT, AUTHORIZATION};

use super::{ProfileFields, ProviderCore, ProviderEndpoints};
use crate::models::{ProviderConfig, ProviderKind};
use crate::oauth2::{ExternalIdentity, OAuthHttpClient, Provider, ProviderAdapter, TokenSet};
use crate::Result;

const SCOPES: &[&str] = &["read:user", "user:email"];

const API_VERSION: &str = "2022-11-28";

// `name` is null for accounts that never set one; `login` always exists
const FIELDS: ProfileFields = ProfileFields {
    id: "id",
    names: &["name", "login"],
    avatar: "avatar_url",
    email: "email",
};

/// GitHub OAuth2 provider
#[derive(Debug, Clone)]
pub struct GitHubProvider {
    core: ProviderCore,
}

impl GitHubProvider {
    pub fn new(config: &ProviderConfig, http: OAuthHttpClient) -> Result<Self> {
        Self::with_endpoints(config, http, ProviderEndpoints::default_for(ProviderKind::GitHub)?)
    }

    pub fn with_endpoints(
        config: &ProviderConfig,
        http: OAuthHttpClient,
        endpoints: ProviderEndpoints,
    ) -> Result<Self> {
        Ok(Self {
            core: ProviderCore::new(ProviderKind::GitHub, config, http, endpoints)?,
        })
    }
}

#[async_trait]
impl Provider for GitHubProvider {
    fn code(&self) -> &str {
        self.core.code()
    }

    fn display_name(&self) -> &str {
        self.core.display_name()
    }

    fn authorization_url(&self, return_path: &str) -> String {
        self.core.authorization_url(return_path, SCOPES, &[])
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
            .fetch_profile(|c| {
                c.get(url.clone())
                    .header(AUTHORIZATION, &bearer)
                    .header(ACCEPT, "application/vnd.github+json")
                    .header("X-GitHub-Api-Version", API_VERSION)
            })
            .await?;

        self.core.map_identity(&FIELDS, &profile, raw, tokens)
    }
}

/// Factory function for GitHub provider
pub fn github_factory(config: &ProviderConfig, http: OAuthHttpClient) -> Result<ProviderAdapter> {
    GitHubProvider::new(config, http).map(ProviderAdapter::GitHub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2::HttpClientSettings;
    use crate::Error;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) -> GitHubProvider {
        let config = ProviderConfig::new(
            "github",
            "Github",
            "gh-client",
            "gh-secret",
            "https://blog.example.com/oauth/authorize/?oauth_app=github",
            true,
        );
        let http = OAuthHttpClient::new(&HttpClientSettings::default()).unwrap();
        let endpoints = ProviderEndpoints::rooted_at(&server.uri(), ProviderKind::GitHub).unwrap();
        GitHubProvider::with_endpoints(&config, http, endpoints).unwrap()
    }

    #[tokio::test]
    async fn test_authorization_url() {
        let server = MockServer::start().await;
        let url = url::Url::parse(&provider(&server).await.authorization_url("/article/1/")).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/login/oauth/authorize");
        assert_eq!(params["client_id"], "gh-client");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "read:user user:email");
        assert_eq!(params["state"], "/article/1/");
        assert_eq!(
            params["redirect_uri"],
            "https://blog.example.com/oauth/authorize/?oauth_app=github"
        );
    }

    #[tokio::test]
    async fn test_exchange_form_encoded_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("client_secret=gh-secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("access_token=abc&refresh_token=def", "application/x-www-form-urlencoded"),
            )
            .mount(&server)
            .await;

        let tokens = provider(&server).await.exchange_code("the-code").await.unwrap();
        assert_eq!(tokens.access_token.secret(), "abc");
        assert_eq!(tokens.refresh_token.unwrap().secret(), "def");
    }

    #[tokio::test]
    async fn test_fetch_identity_sends_github_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer abc"))
            .and(header("accept", "application/vnd.github+json"))
            .and(header("x-github-api-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 42,
                "login": "ann",
                "name": "Ann",
                "avatar_url": "http://x/a.png",
                "email": "ann@x.com"
            })))
            .mount(&server)
            .await;

        let identity = provider(&server)
            .await
            .fetch_identity(&TokenSet::new("abc", None))
            .await
            .unwrap();
        assert_eq!(identity.provider_code, "github");
        assert_eq!(identity.external_id, "42");
        assert_eq!(identity.display_name, "Ann");
        assert_eq!(identity.avatar_url, "http://x/a.png");
        assert_eq!(identity.email.as_deref(), Some("ann@x.com"));
    }

    #[tokio::test]
    async fn test_fetch_identity_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"message":"Bad credentials"}"#))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .fetch_identity(&TokenSet::new("bad", None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProfileFetch { .. }));
    }
}
