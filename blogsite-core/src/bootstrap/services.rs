//! Service initialization and dependency injection

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};

use crate::{
    oauth2::{ProviderRegistry, RegistryOptions},
    repository::{
        AccountStore, LinkedIdentityStore, MemoryAccountStore, MemoryLinkedIdentityStore,
        MemoryProviderConfigStore, PgAccountStore, PgLinkedIdentityStore, PgProviderConfigStore,
        ProviderConfigStore,
    },
    service::{
        EmailDispatcher, EmailTemplateManager, IdentityReconciler, OAuthFlowService, SessionService,
        TokenSigner,
    },
    Config,
};

/// Storage backends behind the service layer
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub identities: Arc<dyn LinkedIdentityStore>,
    pub providers: Arc<dyn ProviderConfigStore>,
}

impl Stores {
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            accounts: Arc::new(PgAccountStore::new(pool.clone())),
            identities: Arc::new(PgLinkedIdentityStore::new(pool.clone())),
            providers: Arc::new(PgProviderConfigStore::new(pool.clone())),
        }
    }

    /// Process-local stores; everything is lost on restart
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(MemoryAccountStore::new()),
            identities: Arc::new(MemoryLinkedIdentityStore::new()),
            providers: Arc::new(MemoryProviderConfigStore::new()),
        }
    }
}

/// Container for all initialized services
#[derive(Clone)]
pub struct Services {
    /// Login flow: provider redirect, callback, email completion
    pub oauth_flow: Arc<OAuthFlowService>,
    pub registry: Arc<ProviderRegistry>,
    pub sessions: SessionService,
}

/// Initialize all core services
///
/// Providers listed in the config file are seeded into the provider store.
pub async fn init_services(stores: Stores, config: &Config) -> Result<Services, anyhow::Error> {
    info!("Initializing services...");

    let registry = Arc::new(ProviderRegistry::new(
        Arc::clone(&stores.providers),
        RegistryOptions::from_config(&config.oauth),
    )?);

    let seeded: Vec<_> = config
        .oauth
        .providers
        .iter()
        .map(crate::config::ProviderSettings::to_provider_config)
        .collect();
    registry.seed(&seeded).await?;

    let enabled = registry.list_enabled().await;
    if enabled.is_empty() {
        warn!("No OAuth2 provider enabled; third-party login is unavailable");
    } else {
        info!(count = enabled.len(), "OAuth2 providers enabled");
    }

    let emails = EmailDispatcher::from_config(&config.email)?;
    if !config.email.is_configured() {
        warn!("SMTP not configured; emails are logged, not delivered");
    }
    let templates = EmailTemplateManager::new()?;
    let signer = TokenSigner::new(config.site.secret_key.clone());
    let sessions = SessionService::new(&config.site.secret_key, &config.session);

    let reconciler = IdentityReconciler::new(
        Arc::clone(&stores.accounts),
        Arc::clone(&stores.identities),
        signer,
        emails,
        templates,
        config.site.clone(),
    );
    let oauth_flow = Arc::new(OAuthFlowService::new(
        Arc::clone(&registry),
        reconciler,
        sessions.clone(),
    ));

    info!("Services initialized");

    Ok(Services {
        oauth_flow,
        registry,
        sessions,
    })
}
