//! OAuth2 relying-party side: provider adapters, transport and registry
//!
//! Every supported provider is a variant of the closed [`ProviderAdapter`]
//! enum. Each variant implements [`Provider`], so callers never branch on
//! provider identity.

pub mod client;
pub mod providers;
pub mod registry;
pub mod token;

pub use client::{HttpClientSettings, OAuthHttpClient};
pub use providers::{GiteeProvider, GitHubProvider, GoogleProvider, ProviderEndpoints};
pub use registry::{ProviderFactory, ProviderRegistry, RegistryOptions};
pub use token::TokenSet;

use async_trait::async_trait;
use oauth2::{AccessToken, RefreshToken};

use crate::models::ProviderKind;
use crate::Result;

/// Canonical identity produced by a provider's user-info endpoint
#[derive(Clone)]
pub struct ExternalIdentity {
    pub provider_code: String,
    pub external_id: String,
    /// May be empty; the reconciler substitutes a placeholder
    pub display_name: String,
    pub avatar_url: String,
    pub email: Option<String>,
    pub access_token: AccessToken,
    pub refresh_token: Option<RefreshToken>,
    /// User-info body as received
    pub raw_profile: String,
}

impl std::fmt::Debug for ExternalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalIdentity")
            .field("provider_code", &self.provider_code)
            .field("external_id", &self.external_id)
            .field("display_name", &self.display_name)
            .field("has_email", &self.email.is_some())
            .finish_non_exhaustive()
    }
}

/// `OAuth2` provider contract
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider code, e.g. `github`
    fn code(&self) -> &str;

    /// Name shown on the login button
    fn display_name(&self) -> &str;

    /// Authorization endpoint URL; `return_path` travels in `state`
    fn authorization_url(&self, return_path: &str) -> String;

    /// Exchange an authorization code for tokens
    async fn exchange_code(&self, code: &str) -> Result<TokenSet>;

    /// Obtain a fresh access token. Not every provider issues refresh tokens.
    async fn refresh_access_token(&self, refresh_token: &RefreshToken) -> Result<AccessToken>;

    /// One user-info call mapped into the canonical shape
    async fn fetch_identity(&self, tokens: &TokenSet) -> Result<ExternalIdentity>;
}

/// Closed set of provider adapters
#[derive(Debug, Clone)]
pub enum ProviderAdapter {
    Gitee(GiteeProvider),
    GitHub(GitHubProvider),
    Google(GoogleProvider),
}

impl ProviderAdapter {
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        match self {
            Self::Gitee(_) => ProviderKind::Gitee,
            Self::GitHub(_) => ProviderKind::GitHub,
            Self::Google(_) => ProviderKind::Google,
        }
    }

    fn inner(&self) -> &dyn Provider {
        match self {
            Self::Gitee(p) => p,
            Self::GitHub(p) => p,
            Self::Google(p) => p,
        }
    }
}

#[async_trait]
impl Provider for ProviderAdapter {
    fn code(&self) -> &str {
        self.inner().code()
    }

    fn display_name(&self) -> &str {
        self.inner().display_name()
    }

    fn authorization_url(&self, return_path: &str) -> String {
        self.inner().authorization_url(return_path)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        self.inner().exchange_code(code).await
    }

    async fn refresh_access_token(&self, refresh_token: &RefreshToken) -> Result<AccessToken> {
        self.inner().refresh_access_token(refresh_token).await
    }

    async fn fetch_identity(&self, tokens: &TokenSet) -> Result<ExternalIdentity> {
        self.inner().fetch_identity(tokens).await
    }
}
