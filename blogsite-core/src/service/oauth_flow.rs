//! OAuth2 login flow: login redirect, callback, email completion
//!
//! HTTP-agnostic. The web layer turns [`CallbackOutcome`] and [`Notice`]
//! into redirects and pages.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::reconciler::{IdentityReconciler, ReconcileOutcome};
use super::session::SessionService;
use crate::models::{Account, LinkedIdentityId, ProviderKind};
use crate::oauth2::{Provider, ProviderAdapter, ProviderRegistry};
use crate::validation::sanitize_return_path;
use crate::{Error, Result};

/// Title and body of an informational result page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub content: String,
}

impl Notice {
    fn new(title: &str, content: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            content: content.into(),
        }
    }

    /// Token exchange or profile fetch failed
    #[must_use]
    pub fn authorization_failed() -> Self {
        Self::new("获取授权失败", "请尝试重新授权")
    }

    /// Provider withheld the identity fields the site needs
    #[must_use]
    pub fn missing_identity_fields() -> Self {
        Self::new("缺少重要信息", "请授权网站获取您的邮箱，用户名，头像")
    }
}

/// Which bind-result page to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStage {
    /// Email submitted, confirmation pending
    EmailSent,
    /// Identity linked
    Success,
}

impl BindStage {
    /// `required=email` means the email step; anything else reads as success
    #[must_use]
    pub fn from_query(required: Option<&str>) -> Self {
        match required {
            Some("email") => Self::EmailSent,
            _ => Self::Success,
        }
    }

    #[must_use]
    pub const fn as_query(&self) -> &'static str {
        match self {
            Self::EmailSent => "email",
            Self::Success => "success",
        }
    }
}

/// Entry in the list of login options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderLink {
    pub code: String,
    pub display_name: String,
    pub login_url: String,
}

/// Where a completed callback leads
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    SignedIn {
        account: Account,
        session_token: String,
        redirect_to: String,
    },
    EmailRequired {
        record_id: LinkedIdentityId,
        redirect_to: String,
    },
}

/// A confirmed email link
#[derive(Debug, Clone)]
pub struct ConfirmedLink {
    pub account: Account,
    pub session_token: String,
    pub redirect_to: String,
}

#[must_use]
pub fn login_path(code: &str) -> String {
    format!("/oauth/login/?oauth_app={code}")
}

#[must_use]
pub fn require_email_path(record_id: &LinkedIdentityId) -> String {
    format!("/oauth/require_email/{record_id}/")
}

#[must_use]
pub fn bind_success_path(record_id: &LinkedIdentityId, stage: BindStage) -> String {
    format!("/oauth/bind_success/{record_id}/?required={}", stage.as_query())
}

#[derive(Clone)]
pub struct OAuthFlowService {
    registry: Arc<ProviderRegistry>,
    reconciler: IdentityReconciler,
    sessions: SessionService,
}

impl std::fmt::Debug for OAuthFlowService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthFlowService")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl OAuthFlowService {
    #[must_use]
    pub const fn new(
        registry: Arc<ProviderRegistry>,
        reconciler: IdentityReconciler,
        sessions: SessionService,
    ) -> Self {
        Self {
            registry,
            reconciler,
            sessions,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn reconciler(&self) -> &IdentityReconciler {
        &self.reconciler
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    /// Provider authorization URL for `oauth_app`; `next` rides along in `state`
    pub async fn start_login(&self, oauth_app: Option<&str>, next: Option<&str>) -> Result<String> {
        let provider = self.provider(oauth_app).await?;
        let return_path = sanitize_return_path(next);
        info!(provider = %provider.code(), return_path = %return_path, "Starting OAuth2 login");
        Ok(provider.authorization_url(&return_path))
    }

    /// Handle the provider redirect back to the site.
    ///
    /// The return path is taken from `state` first, then `next`.
    pub async fn handle_callback(
        &self,
        oauth_app: Option<&str>,
        code: Option<&str>,
        state: Option<&str>,
        next: Option<&str>,
    ) -> Result<CallbackOutcome> {
        let provider = self.provider(oauth_app).await?;
        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::token_exchange(provider.code(), "callback carried no authorization code"))?;

        let tokens = provider.exchange_code(code).await?;
        let identity = provider.fetch_identity(&tokens).await?;

        match self.reconciler.reconcile(identity).await? {
            ReconcileOutcome::Linked { account, .. } => {
                let session_token = self.sessions.issue(&account)?;
                let redirect_to = sanitize_return_path(state.or(next));
                info!(
                    provider = %provider.code(),
                    account_id = %account.id,
                    redirect_to = %redirect_to,
                    "OAuth2 login succeeded"
                );
                Ok(CallbackOutcome::SignedIn {
                    account,
                    session_token,
                    redirect_to,
                })
            }
            ReconcileOutcome::EmailRequired { record } => Ok(CallbackOutcome::EmailRequired {
                redirect_to: require_email_path(&record.id),
                record_id: record.id,
            }),
        }
    }

    /// Record the email typed into the form; returns the bind page to redirect to
    pub async fn submit_missing_email(&self, record_id: &LinkedIdentityId, email: &str) -> Result<String> {
        self.reconciler.submit_email(record_id, email).await?;
        Ok(bind_success_path(record_id, BindStage::EmailSent))
    }

    /// Finish a deferred link from the emailed token and sign the user in
    pub async fn confirm_email(&self, record_id: &LinkedIdentityId, token: &str) -> Result<ConfirmedLink> {
        let (account, _) = self.reconciler.confirm_email(record_id, token).await?;
        let session_token = self.sessions.issue(&account)?;
        Ok(ConfirmedLink {
            account,
            session_token,
            redirect_to: bind_success_path(record_id, BindStage::Success),
        })
    }

    /// Page text for `/oauth/bind_success/{id}/`; unknown records are `NotFound`
    pub async fn bind_notice(&self, record_id: &LinkedIdentityId, stage: BindStage) -> Result<Notice> {
        let record = self
            .reconciler
            .find_record(record_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Linked identity {record_id} not found")))?;

        Ok(match stage {
            BindStage::EmailSent => Notice::new(
                "绑定成功",
                "恭喜您，还差一步就绑定成功了，请登录您的邮箱查看邮件完成绑定，谢谢。",
            ),
            BindStage::Success => {
                let provider_name = self.provider_name(&record.provider_code).await;
                Notice::new(
                    "绑定成功",
                    format!(
                        "恭喜您绑定成功，您以后可以使用{provider_name}来直接免密码登录本站啦，感谢您对本站对关注。"
                    ),
                )
            }
        })
    }

    /// Login options for every enabled provider
    pub async fn providers(&self) -> Vec<ProviderLink> {
        self.registry
            .list_enabled()
            .await
            .iter()
            .map(|p| ProviderLink {
                code: p.code().to_string(),
                display_name: p.display_name().to_string(),
                login_url: login_path(p.code()),
            })
            .collect()
    }

    async fn provider(&self, oauth_app: Option<&str>) -> Result<ProviderAdapter> {
        let code = oauth_app
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::ProviderNotConfigured(String::new()))?;

        match self.registry.resolve(code).await {
            Some(provider) => Ok(provider),
            None => {
                warn!(provider = %code, "OAuth2 request for unknown or disabled provider");
                Err(Error::ProviderNotConfigured(code.to_string()))
            }
        }
    }

    async fn provider_name(&self, code: &str) -> String {
        if let Some(provider) = self.registry.resolve(code).await {
            return provider.display_name().to_string();
        }
        code.parse::<ProviderKind>()
            .map_or_else(|_| code.to_string(), |k| k.default_display_name().to_string())
    }
}
