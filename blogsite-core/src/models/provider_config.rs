//! OAuth2 provider configuration model

use chrono::{DateTime, Utc};
use oauth2::ClientSecret;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Provider kinds with a built-in adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Gitee (码云)
    Gitee,
    /// GitHub
    GitHub,
    /// Google
    Google,
}

impl ProviderKind {
    pub const ALL: [Self; 3] = [Self::Gitee, Self::GitHub, Self::Google];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gitee => "gitee",
            Self::GitHub => "github",
            Self::Google => "google",
        }
    }

    /// Name shown on login buttons when the stored config has none
    #[must_use]
    pub const fn default_display_name(&self) -> &'static str {
        match self {
            Self::Gitee => "码云",
            Self::GitHub => "Github",
            Self::Google => "谷歌",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gitee" => Ok(Self::Gitee),
            "github" => Ok(Self::GitHub),
            "google" => Ok(Self::Google),
            other => Err(Error::ProviderNotConfigured(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored credentials and enablement for one provider code
#[derive(Clone)]
pub struct ProviderConfig {
    pub code: String,
    pub display_name: String,
    pub client_id: String,
    pub client_secret: ClientSecret,
    pub callback_url: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        display_name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_url: impl Into<String>,
        enabled: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            code: code.into(),
            display_name: display_name.into(),
            client_id: client_id.into(),
            client_secret: ClientSecret::new(client_secret.into()),
            callback_url: callback_url.into(),
            enabled,
            created_at: now,
            updated_at: now,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("code", &self.code)
            .field("display_name", &self.display_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("callback_url", &self.callback_url)
            .field("enabled", &self.enabled)
            .finish()
    }
}
