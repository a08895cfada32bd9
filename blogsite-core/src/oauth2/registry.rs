//! Provider registry: provider code -> adapter, built from stored configs
//!
//! Factories are registered explicitly at startup. The set of enabled
//! adapters is cached for a short TTL; callers tolerate that much staleness.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, error, info, warn};

use super::client::{HttpClientSettings, OAuthHttpClient};
use super::providers::{gitee_factory, github_factory, google_factory};
use super::{Provider, ProviderAdapter};
use crate::config::OAuthConfig;
use crate::models::{ProviderConfig, ProviderKind};
use crate::repository::ProviderConfigStore;
use crate::Result;

/// Builds an adapter from a stored config and the transport chosen for it
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderConfig, OAuthHttpClient) -> Result<ProviderAdapter> + Send + Sync>;

/// Registry construction options
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub cache_ttl: Duration,
    pub http: HttpClientSettings,
    pub proxy: Option<String>,
    pub proxied_providers: Vec<String>,
}

impl RegistryOptions {
    #[must_use]
    pub fn from_config(config: &OAuthConfig) -> Self {
        Self {
            cache_ttl: Duration::from_secs(config.provider_cache_ttl_seconds),
            http: HttpClientSettings::from_config(config),
            proxy: config.effective_proxy(),
            proxied_providers: config.proxied_providers.clone(),
        }
    }
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self::from_config(&OAuthConfig::default())
    }
}

pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
    store: Arc<dyn ProviderConfigStore>,
    direct: OAuthHttpClient,
    proxied: Option<OAuthHttpClient>,
    proxied_providers: HashSet<String>,
    snapshot: Cache<(), Arc<Vec<ProviderAdapter>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("proxied_providers", &self.proxied_providers)
            .field("has_proxy", &self.proxied.is_some())
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    /// Registry with the built-in Gitee, GitHub and Google factories
    pub fn new(store: Arc<dyn ProviderConfigStore>, options: RegistryOptions) -> Result<Self> {
        Self::with_factories(store, options, Self::default_factories())
    }

    pub fn with_factories(
        store: Arc<dyn ProviderConfigStore>,
        options: RegistryOptions,
        factories: HashMap<String, ProviderFactory>,
    ) -> Result<Self> {
        let direct = OAuthHttpClient::new(&options.http)?;
        let proxied = options
            .proxy
            .as_ref()
            .map(|proxy| OAuthHttpClient::new(&options.http.clone().with_proxy(Some(proxy.clone()))))
            .transpose()?;

        let snapshot = Cache::builder()
            .max_capacity(1)
            .time_to_live(options.cache_ttl)
            .build();

        info!(
            providers = ?factories.keys().collect::<Vec<_>>(),
            proxy = proxied.is_some(),
            "OAuth2 provider registry initialized"
        );

        Ok(Self {
            factories,
            store,
            direct,
            proxied,
            proxied_providers: options.proxied_providers.into_iter().collect(),
            snapshot,
        })
    }

    /// Factory map for every built-in provider kind
    #[must_use]
    pub fn default_factories() -> HashMap<String, ProviderFactory> {
        let mut factories: HashMap<String, ProviderFactory> = HashMap::new();
        factories.insert(ProviderKind::Gitee.as_str().to_string(), Arc::new(gitee_factory));
        factories.insert(ProviderKind::GitHub.as_str().to_string(), Arc::new(github_factory));
        factories.insert(ProviderKind::Google.as_str().to_string(), Arc::new(google_factory));
        factories
    }

    /// One adapter per enabled, configured provider with a registered factory.
    ///
    /// Store failures are logged and yield an empty list.
    pub async fn list_enabled(&self) -> Vec<ProviderAdapter> {
        match self.snapshot.try_get_with((), self.load_snapshot()).await {
            Ok(adapters) => adapters.as_ref().clone(),
            Err(e) => {
                error!(error = %e, "Failed to load OAuth2 provider configs");
                Vec::new()
            }
        }
    }

    /// Enabled adapter for `code`; `None` for unknown, unconfigured or disabled codes
    pub async fn resolve(&self, code: &str) -> Option<ProviderAdapter> {
        let code = code.trim().to_lowercase();
        self.list_enabled().await.into_iter().find(|a| a.code() == code)
    }

    /// Drop the cached snapshot so the next lookup reads the store
    pub async fn invalidate(&self) {
        self.snapshot.invalidate(&()).await;
    }

    /// Upsert provider configs (typically from the config file) and refresh the snapshot
    pub async fn seed(&self, configs: &[ProviderConfig]) -> Result<()> {
        for config in configs {
            self.store.upsert(config).await?;
            info!(provider = %config.code, enabled = config.enabled, "OAuth2 provider config seeded");
        }
        self.invalidate().await;
        Ok(())
    }

    fn client_for(&self, code: &str) -> OAuthHttpClient {
        match &self.proxied {
            Some(proxied) if self.proxied_providers.contains(code) => proxied.clone(),
            _ => self.direct.clone(),
        }
    }

    async fn load_snapshot(&self) -> Result<Arc<Vec<ProviderAdapter>>> {
        let configs = self.store.list_enabled().await?;
        let mut adapters = Vec::with_capacity(configs.len());

        for config in configs.iter().filter(|c| c.enabled) {
            let Some(factory) = self.factories.get(&config.code) else {
                warn!(provider = %config.code, "No adapter registered for enabled provider, skipping");
                continue;
            };
            match factory(config, self.client_for(&config.code)) {
                Ok(adapter) => adapters.push(adapter),
                Err(e) => warn!(provider = %config.code, error = %e, "Invalid provider config, skipping"),
            }
        }

        debug!(count = adapters.len(), "OAuth2 provider snapshot loaded");
        Ok(Arc::new(adapters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryProviderConfigStore;

    fn config(code: &str, enabled: bool) -> ProviderConfig {
        ProviderConfig::new(
            code,
            "",
            format!("{code}-id"),
            "secret",
            format!("http://127.0.0.1:8080/oauth/authorize/?oauth_app={code}"),
            enabled,
        )
    }

    fn registry(store: Arc<MemoryProviderConfigStore>) -> ProviderRegistry {
        ProviderRegistry::new(store, RegistryOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_only_enabled_known_providers() {
        let store = Arc::new(MemoryProviderConfigStore::with_configs([
            config("github", true),
            config("gitee", false),
            config("weibo", true),
        ]));
        let registry = registry(store);

        let enabled = registry.list_enabled().await;
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].kind(), ProviderKind::GitHub);

        assert!(registry.resolve("github").await.is_some());
        assert!(registry.resolve("GitHub").await.is_some());
        assert!(registry.resolve("gitee").await.is_none());
        assert!(registry.resolve("weibo").await.is_none());
        assert!(registry.resolve("google").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_cached_until_invalidated() {
        let store = Arc::new(MemoryProviderConfigStore::with_configs([config("github", true)]));
        let registry = registry(Arc::clone(&store));

        registry.list_enabled().await;
        registry.resolve("github").await;
        assert_eq!(store.list_calls(), 1);

        store.upsert(&config("github", false)).await.unwrap();
        assert!(registry.resolve("github").await.is_some(), "stale within TTL");

        registry.invalidate().await;
        assert!(registry.resolve("github").await.is_none());
        assert_eq!(store.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_seed_upserts_and_refreshes() {
        let store = Arc::new(MemoryProviderConfigStore::new());
        let registry = registry(Arc::clone(&store));
        assert!(registry.list_enabled().await.is_empty());

        registry
            .seed(&[config("google", true), config("gitee", true)])
            .await
            .unwrap();
        let codes: Vec<_> = registry
            .list_enabled()
            .await
            .iter()
            .map(|a| a.code().to_string())
            .collect();
        assert_eq!(codes, vec!["gitee", "google"]);
    }

    #[tokio::test]
    async fn test_proxy_applies_to_listed_providers_only() {
        let store = Arc::new(MemoryProviderConfigStore::new());
        let options = RegistryOptions {
            proxy: Some("http://127.0.0.1:3128".to_string()),
            ..RegistryOptions::default()
        };
        let registry = ProviderRegistry::new(store, options).unwrap();
        assert!(registry.client_for("github").is_proxied());
        assert!(registry.client_for("google").is_proxied());
        assert!(!registry.client_for("gitee").is_proxied());
    }
}
