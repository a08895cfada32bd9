//! Identity reconciliation: external identity -> linked record -> local account
//!
//! ```text
//!   NewIdentity ──email known──────────────▶ EmailKnownLinked
//!        │
//!        └─no email─▶ EmailMissingPending ──submit_email──▶ EmailSuppliedAwaitingConfirmation
//!                                                                  │ confirm_email
//!                                                                  ▼
//!                                                            ConfirmedLinked
//! ```
//!
//! Every step is idempotent per `(provider_code, external_id)`, so restarting
//! the login flow at any point is safe.

use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use super::email::{mask_email, EmailDispatcher};
use super::email_templates::EmailTemplateManager;
use super::token_signer::TokenSigner;
use crate::config::SiteConfig;
use crate::models::{Account, AccountRequest, IdentityState, LinkedIdentity, LinkedIdentityId, ProviderKind};
use crate::oauth2::ExternalIdentity;
use crate::repository::{AccountStore, LinkedIdentityStore};
use crate::validation::EmailValidator;
use crate::{Error, Result};

/// Username used when the provider gave no usable display name
#[must_use]
pub fn placeholder_username() -> String {
    format!("用户_{}", Local::now().format("%y%m%d%I%M%S"))
}

/// Result of reconciling one login callback
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// Identity is bound to `account`; the caller may start a session
    Linked {
        account: Account,
        record: LinkedIdentity,
    },
    /// Provider disclosed no email; the user must supply one
    EmailRequired { record: LinkedIdentity },
}

impl ReconcileOutcome {
    #[must_use]
    pub const fn record(&self) -> &LinkedIdentity {
        match self {
            Self::Linked { record, .. } | Self::EmailRequired { record } => record,
        }
    }

    #[must_use]
    pub const fn state(&self) -> IdentityState {
        match self {
            Self::Linked { .. } => IdentityState::EmailKnownLinked,
            Self::EmailRequired { .. } => IdentityState::EmailMissingPending,
        }
    }
}

#[derive(Clone)]
pub struct IdentityReconciler {
    accounts: Arc<dyn AccountStore>,
    identities: Arc<dyn LinkedIdentityStore>,
    signer: TokenSigner,
    emails: EmailDispatcher,
    templates: EmailTemplateManager,
    site: SiteConfig,
    validator: Arc<EmailValidator>,
}

impl std::fmt::Debug for IdentityReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityReconciler")
            .field("site", &self.site)
            .finish_non_exhaustive()
    }
}

impl IdentityReconciler {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        identities: Arc<dyn LinkedIdentityStore>,
        signer: TokenSigner,
        emails: EmailDispatcher,
        templates: EmailTemplateManager,
        site: SiteConfig,
    ) -> Self {
        Self {
            accounts,
            identities,
            signer,
            emails,
            templates,
            site,
            validator: Arc::new(EmailValidator::new()),
        }
    }

    /// Persist the identity and bind it to an account when possible.
    ///
    /// An email stored by an earlier, unconfirmed submission does not count:
    /// only an email the provider itself disclosed links immediately.
    pub async fn reconcile(&self, mut identity: ExternalIdentity) -> Result<ReconcileOutcome> {
        if identity.display_name.trim().is_empty() {
            identity.display_name = placeholder_username();
        } else {
            identity.display_name = identity.display_name.trim().to_string();
        }
        identity.email = identity
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        let record = self.identities.upsert(&identity).await?;

        if let Some(account_id) = &record.linked_account_id {
            if let Some(account) = self.accounts.find_by_id(account_id).await? {
                info!(
                    provider = %record.provider_code,
                    record_id = %record.id,
                    account_id = %account.id,
                    "Returning OAuth2 identity reused its linked account"
                );
                return Ok(ReconcileOutcome::Linked { account, record });
            }
            warn!(record_id = %record.id, account_id = %account_id, "Linked account no longer exists");
        }

        match identity.email.as_deref() {
            Some(email) => {
                let (account, record) = self.link(record, email).await?;
                Ok(ReconcileOutcome::Linked { account, record })
            }
            None => {
                info!(
                    provider = %record.provider_code,
                    record_id = %record.id,
                    "Provider disclosed no email, asking the user"
                );
                Ok(ReconcileOutcome::EmailRequired { record })
            }
        }
    }

    /// Store a user-supplied email on a pending record and send the confirmation link.
    ///
    /// The confirmation token only names the record, so the first email
    /// submitted sticks: submitting it again resends the link, a different
    /// address is refused, and linked records accept nothing.
    pub async fn submit_email(&self, record_id: &LinkedIdentityId, email: &str) -> Result<LinkedIdentity> {
        let email = self.validator.normalize(email)?;
        let record = self.require(record_id).await?;

        if record.is_linked() {
            warn!(record_id = %record.id, "Email submitted for an identity that is already linked");
            return Err(Error::AlreadyExists("Identity is already bound to an account".to_string()));
        }
        if record.email.as_deref().is_some_and(|stored| stored != email) {
            warn!(
                record_id = %record.id,
                email = %mask_email(&email),
                "Refused to replace the email awaiting confirmation"
            );
            return Err(Error::InvalidInput(
                "A confirmation email was already sent to another address".to_string(),
            ));
        }

        // Another request may have linked or claimed the record since the read above
        let record = self
            .identities
            .claim_email(record_id, &email)
            .await?
            .ok_or_else(|| Error::InvalidInput("Identity no longer accepts an email".to_string()))?;

        let url = self.confirmation_url(&record.id);
        let message = self.templates.render_bind_confirmation(&email, &url)?;
        self.emails.dispatch(message).await;

        info!(record_id = %record.id, email = %mask_email(&email), "Bind confirmation email queued");
        Ok(record)
    }

    /// Verify the emailed token, then bind the record to an account.
    ///
    /// A forged token changes nothing.
    pub async fn confirm_email(&self, record_id: &LinkedIdentityId, token: &str) -> Result<(Account, LinkedIdentity)> {
        if !self.signer.verify(record_id.as_str(), token) {
            warn!(record_id = %record_id, "Rejected forged or stale confirmation token");
            return Err(Error::InvalidConfirmationToken);
        }

        let record = self.require(record_id).await?;

        let (account, record) = match &record.linked_account_id {
            Some(account_id) => match self.accounts.find_by_id(account_id).await? {
                Some(account) => (account, record),
                None => return Err(Error::NotFound(format!("Account {account_id} not found"))),
            },
            None => {
                let email = record
                    .email
                    .clone()
                    .ok_or_else(|| Error::InvalidInput("No email submitted for this identity".to_string()))?;
                self.link(record, &email).await?
            }
        };

        let provider_name = record
            .provider_code
            .parse::<ProviderKind>()
            .map_or(record.provider_code.as_str(), |k| k.default_display_name());
        let message = self.templates.render_bind_success(
            &account.email,
            provider_name,
            &self.site.absolute_url(""),
        )?;
        self.emails.dispatch(message).await;

        Ok((account, record))
    }

    /// Confirmation token for a record; the email link embeds it
    #[must_use]
    pub fn confirmation_token(&self, record_id: &LinkedIdentityId) -> String {
        self.signer.sign(record_id.as_str())
    }

    #[must_use]
    pub fn confirmation_url(&self, record_id: &LinkedIdentityId) -> String {
        let token = self.confirmation_token(record_id);
        self.site
            .absolute_url(&format!("/oauth/email_verification/{record_id}/{token}/"))
    }

    pub async fn find_record(&self, record_id: &LinkedIdentityId) -> Result<Option<LinkedIdentity>> {
        self.identities.find_by_id(record_id).await
    }

    async fn require(&self, record_id: &LinkedIdentityId) -> Result<LinkedIdentity> {
        self.identities
            .find_by_id(record_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Linked identity {record_id} not found")))
    }

    async fn link(&self, record: LinkedIdentity, email: &str) -> Result<(Account, LinkedIdentity)> {
        let request = AccountRequest::for_provider(
            email,
            record.display_name.clone(),
            placeholder_username(),
            &record.provider_code,
        );
        let account = self.accounts.resolve_or_create(&request).await?;
        let record = self.identities.link_account(&record.id, &account.id).await?;

        info!(
            provider = %record.provider_code,
            record_id = %record.id,
            account_id = %account.id,
            email = %mask_email(email),
            "OAuth2 identity linked"
        );
        Ok((account, record))
    }
}
