/*
[INPUT]:  API key string or MOBULA_API_KEY environment variable
[OUTPUT]: Non-empty ApiKey with redacted Debug output
[POS]:    Auth layer - credential validation at construction time
[UPDATE]: When changing credential sources or validation rules
*/

use std::fmt;

use crate::http::{MobulaError, Result};

/// Environment variable holding the Mobula API key
pub const API_KEY_ENV: &str = "MOBULA_API_KEY";

/// Mobula API key.
///
/// Construction fails on an empty key so misconfiguration surfaces at startup
/// instead of on the first outbound message.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(MobulaError::Config(format!(
                "{API_KEY_ENV} is not set or empty"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Read the key from `MOBULA_API_KEY`
    pub fn from_env() -> Result<Self> {
        match std::env::var(API_KEY_ENV) {
            Ok(value) => Self::new(value),
            Err(_) => Err(MobulaError::Config(format!(
                "{API_KEY_ENV} environment variable is not set"
            ))),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "ApiKey({prefix}...)")
    }
}
