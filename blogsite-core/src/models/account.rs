use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::AccountId;

/// Local site account
///
/// `email` and `username` are both unique at the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    /// Registration source, e.g. `OAuth via github`
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Width of `accounts.username`, in characters
pub const USERNAME_MAX_CHARS: usize = 150;

/// Parameters for the atomic resolve-or-create by email
#[derive(Debug, Clone)]
pub struct AccountRequest {
    /// Normalized (trimmed, lowercased) email
    pub email: String,
    /// Used as username when no account already holds it
    pub preferred_username: String,
    /// Used when `preferred_username` is taken
    pub fallback_username: String,
    pub source: String,
}

impl AccountRequest {
    /// Username candidates are cut to [`USERNAME_MAX_CHARS`] characters.
    #[must_use]
    pub fn for_provider(
        email: impl Into<String>,
        preferred_username: impl Into<String>,
        fallback_username: impl Into<String>,
        provider_code: &str,
    ) -> Self {
        Self {
            email: email.into(),
            preferred_username: truncate_chars(preferred_username.into(), USERNAME_MAX_CHARS),
            fallback_username: truncate_chars(fallback_username.into(), USERNAME_MAX_CHARS),
            source: oauth_source(provider_code),
        }
    }

    /// Usernames to try in order before falling back to [`Self::suffixed_fallback`]
    #[must_use]
    pub fn username_candidates(&self) -> [&str; 2] {
        [self.preferred_username.as_str(), self.fallback_username.as_str()]
    }

    /// Placeholder with a random suffix, for when both candidates are taken
    #[must_use]
    pub fn suffixed_fallback(&self) -> String {
        let suffix = nanoid::nanoid!(6);
        let stem = truncate_chars(self.fallback_username.clone(), USERNAME_MAX_CHARS - suffix.len() - 1);
        format!("{stem}_{suffix}")
    }
}

fn truncate_chars(mut s: String, max: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
    s
}

/// Registration source recorded on accounts created through a provider login
#[must_use]
pub fn oauth_source(provider_code: &str) -> String {
    format!("OAuth via {provider_code}")
}
