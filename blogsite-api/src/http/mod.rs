// Module: http
// Browser-facing OAuth2 login routes and result pages

pub mod error;
pub mod health;
pub mod oauth;
pub mod pages;

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use blogsite_core::bootstrap::Services;
use blogsite_core::config::Config;
use blogsite_core::service::OAuthFlowService;

pub use error::{AppError, AppResult};
pub use pages::PageRenderer;

/// Session cookie attributes
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub max_age_seconds: u64,
    pub secure: bool,
}

impl SessionCookie {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.session.cookie_name.clone(),
            max_age_seconds: config.session.max_age_seconds,
            secure: config.site.https,
        }
    }

    /// `Set-Cookie` value carrying `token`
    #[must_use]
    pub fn header_value(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.name, token, self.max_age_seconds
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<OAuthFlowService>,
    pub pages: PageRenderer,
    pub cookie: SessionCookie,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        flow: Arc<OAuthFlowService>,
        cookie: SessionCookie,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            flow,
            pages: PageRenderer::new()?,
            cookie,
            request_timeout,
        })
    }

    pub fn from_services(services: &Services, config: &Config) -> anyhow::Result<Self> {
        Self::new(
            Arc::clone(&services.oauth_flow),
            SessionCookie::from_config(config),
            Duration::from_secs(config.server.request_timeout_seconds),
        )
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let timeout = state.request_timeout;

    Router::new()
        // Health check endpoints
        .merge(health::create_health_router())
        // OAuth2 login flow
        .route("/oauth/login/", get(oauth::login))
        .route("/oauth/authorize/", get(oauth::authorize))
        .route(
            "/oauth/require_email/{id}/",
            get(oauth::require_email_form).post(oauth::submit_email),
        )
        .route("/oauth/bind_success/{id}/", get(oauth::bind_success))
        .route(
            "/oauth/email_verification/{id}/{token}/",
            get(oauth::email_verification),
        )
        .route("/oauth/providers/", get(oauth::list_providers))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        // Apply state to all routes (must be last)
        .with_state(state)
}
