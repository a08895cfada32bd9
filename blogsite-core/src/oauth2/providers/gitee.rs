//! Gitee (码云) OAuth2 provider

use async_trait::async_trait;
use oauth2::{AccessToken, RefreshToken};

use super::{ProfileFields, ProviderCore, ProviderEndpoints};
use crate::models::{ProviderConfig, ProviderKind};
use crate::oauth2::{ExternalIdentity, OAuthHttpClient, Provider, ProviderAdapter, TokenSet};
use crate::Result;

const SCOPES: &[&str] = &["user_info", "emails"];

const FIELDS: ProfileFields = ProfileFields {
    id: "id",
    names: &["name"],
    avatar: "avatar_url",
    email: "email",
};

/// Gitee OAuth2 provider
///
/// The user-info API takes the access token as a query parameter.
#[derive(Debug, Clone)]
pub struct GiteeProvider {
    core: ProviderCore,
}

impl GiteeProvider {
    pub fn new(config: &ProviderConfig, http: OAuthHttpClient) -> Result<Self> {
        Self::with_endpoints(config, http, ProviderEndpoints::default_for(ProviderKind::Gitee)?)
    }

    pub fn with_endpoints(
        config: &ProviderConfig,
        http: OAuthHttpClient,
        endpoints: ProviderEndpoints,
    ) -> Result<Self> {
        Ok(Self {
            core: ProviderCore::new(ProviderKind::Gitee, config, http, endpoints)?,
        })
    }
}

#[async_trait]
impl Provider for GiteeProvider {
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
        let query = [("access_token", tokens.access_token.secret().as_str())];

        let (profile, raw) = self
            .core
            .fetch_profile(|c| c.get(url.clone()).query(&query[..]))
            .await?;

        self.core.map_identity(&FIELDS, &profile, raw, tokens)
    }
}

/// Factory function for Gitee provider
pub fn gitee_factory(config: &ProviderConfig, http: OAuthHttpClient) -> Result<ProviderAdapter> {
    GiteeProvider::new(config, http).map(ProviderAdapter::Gitee)
}
