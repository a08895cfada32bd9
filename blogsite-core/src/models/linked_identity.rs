//! Persisted link between an external provider identity and a local account

use chrono::{DateTime, Utc};
use oauth2::{AccessToken, RefreshToken};
use serde::Serialize;

use crate::models::{AccountId, LinkedIdentityId};

/// Reconciliation state of an external identity.
///
/// Never stored; derived from the record or produced by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityState {
    NewIdentity,
    EmailKnownLinked,
    EmailMissingPending,
    EmailSuppliedAwaitingConfirmation,
    ConfirmedLinked,
}

impl IdentityState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::EmailKnownLinked | Self::ConfirmedLinked)
    }
}

#[derive(Clone)]
pub struct LinkedIdentity {
    pub id: LinkedIdentityId,
    pub provider_code: String,
    pub external_id: String,
    pub display_name: String,
    pub avatar_url: String,
    pub email: Option<String>,
    pub access_token: AccessToken,
    pub refresh_token: Option<RefreshToken>,
    /// Provider user-info body as received
    pub raw_profile: String,
    /// Set exactly once, when reconciliation completes
    pub linked_account_id: Option<AccountId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LinkedIdentity {
    /// Derive the state from what is stored.
    ///
    /// Both terminal states look the same once persisted, so a linked
    /// record reports `EmailKnownLinked`.
    #[must_use]
    pub const fn state(&self) -> IdentityState {
        match (&self.linked_account_id, &self.email) {
            (Some(_), _) => IdentityState::EmailKnownLinked,
            (None, Some(_)) => IdentityState::EmailSuppliedAwaitingConfirmation,
            (None, None) => IdentityState::EmailMissingPending,
        }
    }

    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.linked_account_id.is_some()
    }
}

impl std::fmt::Debug for LinkedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkedIdentity")
            .field("id", &self.id)
            .field("provider_code", &self.provider_code)
            .field("external_id", &self.external_id)
            .field("display_name", &self.display_name)
            .field("email", &self.email.as_deref().map(crate::service::email::mask_email))
            .field("linked_account_id", &self.linked_account_id)
            .finish_non_exhaustive()
    }
}
