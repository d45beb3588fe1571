/*
[INPUT]:  HTTP configuration (base URL, timeouts, API key)
[OUTPUT]: Configured reqwest client ready for API calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::auth::ApiKey;
use crate::http::{MobulaError, Result};

/// Base URL for the Mobula REST API
pub const API_BASE_URL: &str = "https://api.mobula.io/api/1";
/// Chain every request is scoped to
pub const DEFAULT_BLOCKCHAIN: &str = "solana";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub blockchain: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
            blockchain: DEFAULT_BLOCKCHAIN.to_string(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_blockchain(mut self, blockchain: impl Into<String>) -> Self {
        self.blockchain = blockchain.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Main HTTP client for the Mobula API
#[derive(Debug)]
pub struct MobulaClient {
    http_client: Client,
    base_url: String,
    blockchain: String,
    api_key: ApiKey,
    timeout: Duration,
    pub(crate) sol_price_usd: OnceCell<f64>,
}

impl MobulaClient {
    /// Create a new client with default configuration
    pub fn new(api_key: ApiKey) -> Result<Self> {
        Self::with_config(ClientConfig::default(), api_key)
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig, api_key: ApiKey) -> Result<Self> {
        // Validate once so per-request URL building cannot fail on the base.
        Url::parse(&config.base_url)?;

        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            blockchain: config.blockchain,
            api_key,
            timeout: config.timeout,
            sol_price_usd: OnceCell::new(),
        })
    }

    pub fn blockchain(&self) -> &str {
        &self.blockchain
    }

    /// Build full URL for an endpoint under the API base path
    fn url(&self, endpoint: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.base_url, endpoint))?)
    }

    /// Build an authorized request builder
    pub(crate) fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.url(endpoint)?;
        Ok(self
            .http_client
            .request(method, url)
            .header(AUTHORIZATION, self.api_key.expose()))
    }

    /// Send a request and decode the JSON body, mapping error statuses
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                MobulaError::Timeout {
                    duration: self.timeout.as_secs(),
                }
            } else {
                MobulaError::Http(err)
            }
        })?;

        let status = response.status();
        let url = response.url().clone();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await?;

        debug!(%url, status = status.as_u16(), bytes = body.len(), "api response");

        if !status.is_success() {
            return Err(MobulaError::from_status(status, retry_after, &body));
        }

        serde_json::from_str(&body).map_err(|err| {
            MobulaError::InvalidResponse(format!("{url}: {err}"))
        })
    }
}
