//! In-memory stores with the same semantics as the Postgres ones
//!
//! Used by the test suites and by `blogsite --in-memory` for local demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{AccountStore, LinkedIdentityStore, ProviderConfigStore};
use crate::models::{Account, AccountId, AccountRequest, LinkedIdentity, LinkedIdentityId, ProviderConfig};
use crate::oauth2::ExternalIdentity;
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<AccountId, Account>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.accounts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn all(&self) -> Vec<Account> {
        self.accounts.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>> {
        Ok(self.accounts.lock().await.get(id).cloned())
    }

    async fn resolve_or_create(&self, request: &AccountRequest) -> Result<Account> {
        let mut accounts = self.accounts.lock().await;
        if let Some(existing) = accounts.values().find(|a| a.email == request.email) {
            return Ok(existing.clone());
        }

        let taken = |name: &str| accounts.values().any(|a| a.username == name);
        let username = request
            .username_candidates()
            .into_iter()
            .find(|c| !c.is_empty() && !taken(*c))
            .map_or_else(|| request.suffixed_fallback(), str::to_string);

        let now = Utc::now();
        let account = Account {
            id: AccountId::new(),
            username,
            email: request.email.clone(),
            is_active: true,
            source: request.source.clone(),
            created_at: now,
            updated_at: now,
        };
        accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }
}

#[derive(Debug, Default)]
pub struct MemoryLinkedIdentityStore {
    records: Mutex<HashMap<LinkedIdentityId, LinkedIdentity>>,
}

impl MemoryLinkedIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn all(&self) -> Vec<LinkedIdentity> {
        self.records.lock().await.values().cloned().collect()
    }

    async fn update<F>(&self, id: &LinkedIdentityId, apply: F) -> Result<LinkedIdentity>
    where
        F: FnOnce(&mut LinkedIdentity) + Send,
    {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Linked identity {id} not found")))?;
        apply(record);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

#[async_trait]
impl LinkedIdentityStore for MemoryLinkedIdentityStore {
    async fn upsert(&self, identity: &ExternalIdentity) -> Result<LinkedIdentity> {
        let mut records = self.records.lock().await;
        let now = Utc::now();

        let existing = records.values_mut().find(|r| {
            r.provider_code == identity.provider_code && r.external_id == identity.external_id
        });

        if let Some(record) = existing {
            record.display_name.clone_from(&identity.display_name);
            record.avatar_url.clone_from(&identity.avatar_url);
            if identity.email.is_some() {
                record.email.clone_from(&identity.email);
            }
            record.access_token = identity.access_token.clone();
            if identity.refresh_token.is_some() {
                record.refresh_token.clone_from(&identity.refresh_token);
            }
            record.raw_profile.clone_from(&identity.raw_profile);
            record.updated_at = now;
            return Ok(record.clone());
        }

        let record = LinkedIdentity {
            id: LinkedIdentityId::new(),
            provider_code: identity.provider_code.clone(),
            external_id: identity.external_id.clone(),
            display_name: identity.display_name.clone(),
            avatar_url: identity.avatar_url.clone(),
            email: identity.email.clone(),
            access_token: identity.access_token.clone(),
            refresh_token: identity.refresh_token.clone(),
            raw_profile: identity.raw_profile.clone(),
            linked_account_id: None,
            created_at: now,
            updated_at: now,
        };
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: &LinkedIdentityId) -> Result<Option<LinkedIdentity>> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn claim_email(&self, id: &LinkedIdentityId, email: &str) -> Result<Option<LinkedIdentity>> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(id) else {
            return Ok(None);
        };
        if record.linked_account_id.is_some() || record.email.as_deref().is_some_and(|e| e != email) {
            return Ok(None);
        }
        record.email = Some(email.to_string());
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn link_account(&self, id: &LinkedIdentityId, account_id: &AccountId) -> Result<LinkedIdentity> {
        let account_id = account_id.clone();
        self.update(id, move |r| {
            if r.linked_account_id.is_none() {
                r.linked_account_id = Some(account_id);
            }
        })
        .await
    }
}

/// Provider configs held in memory; counts snapshot loads so cache behaviour is observable
#[derive(Debug, Default)]
pub struct MemoryProviderConfigStore {
    configs: Mutex<HashMap<String, ProviderConfig>>,
    list_calls: AtomicUsize,
}

impl MemoryProviderConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_configs(configs: impl IntoIterator<Item = ProviderConfig>) -> Self {
        let map = configs.into_iter().map(|c| (c.code.clone(), c)).collect();
        Self {
            configs: Mutex::new(map),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `list_enabled` hit this store
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderConfigStore for MemoryProviderConfigStore {
    async fn list_enabled(&self) -> Result<Vec<ProviderConfig>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut enabled: Vec<_> = self
            .configs
            .lock()
            .await
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect();
        enabled.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(enabled)
    }

    async fn upsert(&self, config: &ProviderConfig) -> Result<()> {
        let mut configs = self.configs.lock().await;
        let mut config = config.clone();
        if let Some(existing) = configs.get(&config.code) {
            config.created_at = existing.created_at;
        }
        config.updated_at = Utc::now();
        configs.insert(config.code.clone(), config);
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2::TokenSet;
    use std::sync::Arc;

    fn identity(external_id: &str, email: Option<&str>) -> ExternalIdentity {
        let tokens = TokenSet::new("abc", Some("def".to_string()));
        ExternalIdentity {
            provider_code: "github".to_string(),
            external_id: external_id.to_string(),
            display_name: "Ann".to_string(),
            avatar_url: "http://x/a.png".to_string(),
            email: email.map(str::to_string),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            raw_profile: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_refreshes_but_keeps_email_and_link() {
        let store = MemoryLinkedIdentityStore::new();
        let first = store.upsert(&identity("42", Some("ann@x.com"))).await.unwrap();
        store.link_account(&first.id, &AccountId::from("acc000000001")).await.unwrap();

        let mut again = identity("42", None);
        again.display_name = "Ann B".to_string();
        again.refresh_token = None;
        let second = store.upsert(&again).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.display_name, "Ann B");
        assert_eq!(second.email.as_deref(), Some("ann@x.com"));
        assert_eq!(second.refresh_token.unwrap().secret(), "def");
        assert_eq!(second.linked_account_id, Some(AccountId::from("acc000000001")));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_link_account_is_set_once() {
        let store = MemoryLinkedIdentityStore::new();
        let record = store.upsert(&identity("7", None)).await.unwrap();
        store.link_account(&record.id, &AccountId::from("first0000000")).await.unwrap();
        let relinked = store.link_account(&record.id, &AccountId::from("second000000")).await.unwrap();
        assert_eq!(relinked.linked_account_id, Some(AccountId::from("first0000000")));
    }

    #[tokio::test]
    async fn test_resolve_or_create_username_fallbacks() {
        let store = MemoryAccountStore::new();
        let a = store
            .resolve_or_create(&AccountRequest::for_provider("a@x.com", "Ann", "用户_1", "github"))
            .await
            .unwrap();
        let b = store
            .resolve_or_create(&AccountRequest::for_provider("b@x.com", "Ann", "用户_1", "gitee"))
            .await
            .unwrap();
        let c = store
            .resolve_or_create(&AccountRequest::for_provider("c@x.com", "Ann", "用户_1", "google"))
            .await
            .unwrap();

        assert_eq!(a.username, "Ann");
        assert_eq!(b.username, "用户_1");
        assert!(c.username.starts_with("用户_1_"));
        assert_eq!(b.source, "OAuth via gitee");
        assert!(a.is_active);
    }

    #[tokio::test]
    async fn test_concurrent_resolve_creates_one_account() {
        let store = Arc::new(MemoryAccountStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .resolve_or_create(&AccountRequest::for_provider(
                            "race@x.com",
                            format!("user{i}"),
                            "用户_race",
                            "github",
                        ))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().id);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_claim_email_only_while_pending() {
        let store = MemoryLinkedIdentityStore::new();
        let record = store.upsert(&identity("9", None)).await.unwrap();

        let claimed = store.claim_email(&record.id, "bob@x.com").await.unwrap().unwrap();
        assert_eq!(claimed.email.as_deref(), Some("bob@x.com"));
        assert!(store.claim_email(&record.id, "bob@x.com").await.unwrap().is_some());
        assert!(store.claim_email(&record.id, "eve@x.com").await.unwrap().is_none());

        store.link_account(&record.id, &AccountId::from("acc000000009")).await.unwrap();
        assert!(store.claim_email(&record.id, "bob@x.com").await.unwrap().is_none());

        let stored = store.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.email.as_deref(), Some("bob@x.com"));
        assert!(store
            .claim_email(&LinkedIdentityId::from("missing00000"), "bob@x.com")
            .await
            .unwrap()
            .is_none());
    }
}
