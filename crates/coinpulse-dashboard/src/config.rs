/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed dashboard configuration and the adapter configs derived from it
[POS]:    Configuration layer - dashboard setup
[UPDATE]: When adding new configuration options
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use coinpulse_adapter::http::client::{API_BASE_URL, DEFAULT_BLOCKCHAIN};
use coinpulse_adapter::ws::STREAM_URL;
use coinpulse_adapter::{ApiKey, ClientConfig, WebSocketConfig};
use serde::{Deserialize, Serialize};

use crate::layout::{Position, WidgetKind};

const LAYOUT_DIR: &str = "coinpulse";
const LAYOUT_FILE: &str = "layout.json";

/// Top-level configuration for the dashboard
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DashboardConfig {
    /// Mobula API key; `MOBULA_API_KEY` is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub feed: FeedSettings,
    /// Where the widget layout is persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_path: Option<PathBuf>,
    /// Widgets placed when no saved layout exists
    #[serde(default)]
    pub widgets: Vec<WidgetSeed>,
}

/// Streaming connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamSettings {
    #[serde(default = "default_stream_url")]
    pub url: String,
    #[serde(default = "default_true")]
    pub reconnect: bool,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            reconnect: default_true(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl StreamSettings {
    pub fn to_websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .with_url(self.url.clone())
            .with_reconnect(self.reconnect)
            .with_reconnect_interval(Duration::from_millis(self.reconnect_interval_ms))
            .with_max_reconnect_attempts(self.max_reconnect_attempts)
    }
}

/// REST API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiSettings {
    pub fn to_client_config(&self, blockchain: &str) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(self.base_url.clone())
            .with_blockchain(blockchain)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

/// Feed behaviour shared by every widget
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedSettings {
    #[serde(default = "default_blockchain")]
    pub blockchain: String,
    /// Trades kept per target
    #[serde(default = "default_max_trades_display")]
    pub max_trades_display: usize,
    /// Pending trade flush period
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            blockchain: default_blockchain(),
            max_trades_display: default_max_trades_display(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl FeedSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Widget placed on first start
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WidgetSeed {
    pub kind: WidgetKind,
    pub contract_address: String,
    #[serde(default)]
    pub position: Position,
}

impl DashboardConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content).context("parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.feed.blockchain.trim().is_empty() {
            return Err(anyhow!("feed.blockchain cannot be empty"));
        }
        if self.feed.max_trades_display == 0 {
            return Err(anyhow!("feed.max_trades_display must be at least 1"));
        }
        if self.feed.flush_interval_ms == 0 {
            return Err(anyhow!("feed.flush_interval_ms must be at least 1"));
        }
        Ok(())
    }

    /// Configured key, else the environment
    pub fn api_key(&self) -> anyhow::Result<ApiKey> {
        let key = match self.api_key.as_deref() {
            Some(key) => ApiKey::new(key),
            None => ApiKey::from_env(),
        };
        key.context("resolve mobula api key")
    }

    /// Configured layout path, else the per-user data directory
    pub fn layout_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.layout_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
        Ok(data_dir.join(LAYOUT_DIR).join(LAYOUT_FILE))
    }
}

fn default_stream_url() -> String {
    STREAM_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_reconnect_interval_ms() -> u64 {
    3000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_base_url() -> String {
    API_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_blockchain() -> String {
    DEFAULT_BLOCKCHAIN.to_string()
}

fn default_max_trades_display() -> usize {
    20
}

fn default_flush_interval_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config: DashboardConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.stream.url, STREAM_URL);
        assert!(config.stream.reconnect);
        assert_eq!(config.stream.reconnect_interval_ms, 3000);
        assert_eq!(config.stream.max_reconnect_attempts, 5);
        assert_eq!(config.feed.blockchain, "solana");
        assert_eq!(config.feed.max_trades_display, 20);
        assert_eq!(config.feed.flush_interval(), Duration::from_secs(1));
        assert!(config.widgets.is_empty());
    }

    #[test]
    fn parses_widgets_and_overrides() {
        let yaml = r#"
api_key: abc
stream:
  reconnect_interval_ms: 500
  max_reconnect_attempts: 2
feed:
  max_trades_display: 5
layout_path: /tmp/coinpulse-layout.json
widgets:
  - kind: LIVE_PRICE
    contract_address: DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263
    position: { x: 1, y: 2 }
  - kind: TRADE_FEED
    contract_address: DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263
"#;
        let config: DashboardConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.api_key().unwrap().expose(), "abc");
        assert_eq!(config.feed.max_trades_display, 5);
        assert_eq!(config.widgets.len(), 2);
        assert_eq!(config.widgets[0].kind, WidgetKind::LivePrice);
        assert_eq!(config.widgets[0].position, Position { x: 1, y: 2 });
        assert_eq!(config.widgets[1].position, Position::default());
        assert_eq!(
            config.layout_path().unwrap(),
            PathBuf::from("/tmp/coinpulse-layout.json")
        );

        let ws = config.stream.to_websocket_config();
        assert_eq!(ws.reconnect_interval, Duration::from_millis(500));
        assert_eq!(ws.max_reconnect_attempts, 2);
    }

    #[test]
    fn rejects_zero_flush_interval() {
        let config: DashboardConfig =
            serde_yaml::from_str("feed: { flush_interval_ms: 0 }").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_configured_key_is_an_error() {
        let config = DashboardConfig {
            api_key: Some(String::new()),
            ..DashboardConfig::default()
        };
        assert!(config.api_key().is_err());
    }
}
