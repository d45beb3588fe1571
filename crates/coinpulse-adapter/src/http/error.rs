/*
[INPUT]:  Error sources (HTTP, API, serialization, WebSocket, decoding, configuration)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the Mobula adapter
#[derive(Error, Debug)]
pub enum MobulaError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// API key rejected by the provider
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Inbound stream frame could not be decoded
    #[error("Invalid stream message: {0}")]
    InvalidMessage(String),

    /// Contract address failed validation
    #[error("Invalid contract address: {0}")]
    InvalidAddress(String),

    /// Domain value failed validation
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimit { retry_after: u64 },

    /// Connection timeout
    #[error("Connection timeout after {duration}s")]
    Timeout { duration: u64 },
}

impl MobulaError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MobulaError::Http(_)
                | MobulaError::RateLimit { .. }
                | MobulaError::Timeout { .. }
                | MobulaError::WebSocket(_)
                | MobulaError::InvalidResponse(_)
        )
    }

    /// Get retry delay in seconds (if retryable)
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            MobulaError::RateLimit { retry_after } => Some(*retry_after),
            MobulaError::Timeout { .. } => Some(1),
            _ => None,
        }
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        matches!(self, MobulaError::Authentication { .. })
    }

    /// Map a non-success HTTP status to the matching error variant
    pub fn from_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MobulaError::Authentication {
                message: "API key rejected, check MOBULA_API_KEY".to_string(),
            },
            StatusCode::TOO_MANY_REQUESTS => MobulaError::RateLimit {
                retry_after: retry_after.unwrap_or(1),
            },
            StatusCode::NOT_FOUND => MobulaError::api_error(status, "token not found"),
            _ if body.trim().is_empty() => MobulaError::api_error(status, format!("server error: {status}")),
            _ => MobulaError::api_error(status, body.trim()),
        }
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        MobulaError::Api {
            code: status.as_u16() as i32,
            message: message.into(),
        }
    }
}

/// Result type alias for Mobula operations
pub type Result<T> = std::result::Result<T, MobulaError>;
