//! Outbound HTTP transport shared by all provider adapters

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use tracing::warn;

use crate::config::OAuthConfig;
use crate::resilience::retry::{is_retryable, provider_backoff};
use crate::{Error, Result};

/// Transport settings for provider calls
#[derive(Debug, Clone)]
pub struct HttpClientSettings {
    pub timeout: Duration,
    pub max_retries: usize,
    pub user_agent: String,
    pub proxy: Option<String>,
}

impl HttpClientSettings {
    #[must_use]
    pub fn from_config(config: &OAuthConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.http_timeout_seconds),
            max_retries: config.http_max_retries,
            user_agent: config.user_agent.clone(),
            proxy: None,
        }
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self::from_config(&OAuthConfig::default())
    }
}

/// reqwest client with a per-request timeout and bounded retry on transport failures
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct OAuthHttpClient {
    client: Client,
    max_retries: usize,
    proxied: bool,
}

impl OAuthHttpClient {
    pub fn new(settings: &HttpClientSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout)
            .user_agent(settings.user_agent.clone());

        if let Some(proxy) = &settings.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::InvalidInput(format!("Invalid OAuth proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        } else {
            // Proxy selection is explicit per provider; ignore ambient env vars
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build OAuth HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: settings.max_retries,
            proxied: settings.proxy.is_some(),
        })
    }

    /// Whether requests go through a proxy
    #[must_use]
    pub const fn is_proxied(&self) -> bool {
        self.proxied
    }

    /// Send a request, retrying only when the transport failed.
    ///
    /// `build` is called once per attempt. HTTP error statuses are returned
    /// to the caller untouched.
    pub async fn send<F>(&self, provider: &str, build: F) -> std::result::Result<Response, reqwest::Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        use backon::BackoffBuilder;

        let backoff = provider_backoff(self.max_retries).build();
        let mut attempt = 0usize;

        let mut last_err = None;
        for delay in std::iter::once(Duration::ZERO).chain(backoff) {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;

            match build(&self.client).send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !is_retryable(&e) {
                        return Err(e);
                    }
                    warn!(provider, attempt, error = %e, "OAuth provider request failed, retrying");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            // The attempt iterator always yields at least once
            None => build(&self.client).send().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_timeout_is_retried_then_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(3)
            .mount(&server)
            .await;

        let client = OAuthHttpClient::new(&HttpClientSettings {
            timeout: Duration::from_millis(50),
            max_retries: 2,
            user_agent: "test".to_string(),
            proxy: None,
        })
        .unwrap();

        let url = format!("{}/slow", server.uri());
        let err = client.send("test", |c| c.get(&url)).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_error_status_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boom"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = OAuthHttpClient::new(&HttpClientSettings::default()).unwrap();
        let url = format!("{}/boom", server.uri());
        let response = client.send("test", |c| c.get(&url)).await.unwrap();
        assert_eq!(response.status().as_u16(), 500);
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let settings = HttpClientSettings::default().with_proxy(Some("::not a url::".to_string()));
        assert!(OAuthHttpClient::new(&settings).is_err());
    }
}
