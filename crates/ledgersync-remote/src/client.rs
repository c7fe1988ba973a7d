//! ERP REST API client
//!
//! Provides a JSON HTTP client for the ERP backend. Handles authentication
//! headers, URL construction and mapping of HTTP statuses to [`RemoteError`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ledgersync_core::ports::IRemoteApi;
//! use ledgersync_remote::client::HttpRemoteApi;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let api = HttpRemoteApi::with_base_url("https://erp.example.in")?.with_access_token("token");
//! let customers = api.get("/api/crm/customers").await?;
//! println!("{customers}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use ledgersync_core::config::RemoteConfig;
use ledgersync_core::ports::IRemoteApi;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::{RemoteError, DEFAULT_RETRY_AFTER};

/// HTTP client for the ERP REST API
///
/// Wraps `reqwest::Client` with an optional bearer token and base URL
/// construction. Paths passed to the [`IRemoteApi`] methods are appended
/// to the base URL verbatim.
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    /// The underlying HTTP client
    client: Client,
    /// Base URL without trailing slash
    base_url: String,
    /// Bearer token, if the backend requires one
    access_token: Option<String>,
}

impl HttpRemoteApi {
    /// Builds a client from the `remote` configuration section
    pub fn from_config(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let mut api = Self::with_client(client, &config.base_url)?;
        api.access_token = config.access_token.clone();
        Ok(api)
    }

    /// Creates a client with default settings (useful for testing)
    pub fn with_base_url(base_url: impl AsRef<str>) -> Result<Self, RemoteError> {
        Self::with_client(Client::new(), base_url.as_ref())
    }

    fn with_client(client: Client, base_url: &str) -> Result<Self, RemoteError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RemoteError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                parsed.scheme(),
                base_url
            )));
        }
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: None,
        })
    }

    /// Sets the bearer token sent with every request
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Updates the access token (e.g., after the host application re-authenticates)
    pub fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token;
        debug!("Updated remote API access token");
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns a reference to the underlying reqwest Client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Creates a request builder for `path` with the auth header attached
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, RemoteError> {
        if !path.starts_with('/') {
            return Err(RemoteError::InvalidUrl(format!(
                "request path must start with '/': {}",
                path
            )));
        }
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, &url);
        Ok(match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Sends a request and decodes the JSON response
    ///
    /// An empty body (e.g. `204 No Content`) decodes to `Value::Null`.
    pub async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        let mut builder = self.request(method.clone(), path)?;
        if let Some(body) = body {
            builder = builder.json(body);
        }

        debug!(%method, path, "Sending remote request");
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER));
            let text = response.text().await.unwrap_or_default();
            warn!(%method, path, status = status.as_u16(), "Remote request failed");
            return Err(RemoteError::from_status(status, text, retry_after));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            RemoteError::InvalidResponse(format!("{} {} returned non-JSON body: {}", method, path, e))
        })
    }
}

/// Parses a `Retry-After` header value (integer seconds or HTTP-date)
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Ok(secs) = u64::try_from((target - now).num_seconds()) {
                return Duration::from_secs(secs.min(3600));
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

#[async_trait::async_trait]
impl IRemoteApi for HttpRemoteApi {
    async fn get(&self, path: &str) -> anyhow::Result<Value> {
        Ok(self.send_json(Method::GET, path, None).await?)
    }

    async fn post(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        Ok(self.send_json(Method::POST, path, Some(body)).await?)
    }

    async fn put(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        Ok(self.send_json(Method::PUT, path, Some(body)).await?)
    }

    async fn delete(&self, path: &str) -> anyhow::Result<Value> {
        Ok(self.send_json(Method::DELETE, path, None).await?)
    }

    fn failure_code(&self, err: &anyhow::Error) -> String {
        err.downcast_ref::<RemoteError>()
            .map_or("remote", RemoteError::code)
            .to_string()
    }
}
