use std::time::Duration;

use outpost_domain::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use outpost_domain::OutpostError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder};

use crate::errors::InfraError;

/// Base-URL-aware HTTP client.
///
/// Performs exactly one attempt per request; retry policy belongs to the sync
/// orchestrator so every attempt is visible in the queue's retry bookkeeping.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    base_url: String,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder(base_url: impl Into<String>) -> HttpClientBuilder {
        HttpClientBuilder::new(base_url)
    }

    /// Base URL every request path is joined onto.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path` (which must start with `/`).
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create a request builder for `path` relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url_for(path))
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: Option<String>,
    bearer_token: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl HttpClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            user_agent: None,
            bearer_token: None,
            default_headers: None,
        }
    }

    /// Per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the `User-Agent` header.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Headers sent with every request.
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// # Errors
    /// `OutpostError::Config` for an unusable base URL or token.
    pub fn build(self) -> Result<HttpClient, OutpostError> {
        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(OutpostError::Config(format!(
                "base URL must start with http:// or https://, got '{base_url}'"
            )));
        }

        let mut headers = self.default_headers.unwrap_or_default();
        if let Some(token) = self.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                OutpostError::Config("auth token contains invalid header characters".into())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder =
            ReqwestClient::builder().timeout(self.timeout).no_proxy().default_headers(headers);

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder.build().map_err(|err| {
            let infra: InfraError = err.into();
            OutpostError::from(infra)
        })?;

        Ok(HttpClient { client, base_url })
    }
}
