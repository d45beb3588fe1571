/*
[INPUT]:  Dashboard scenarios needing a transport, snapshots and a layout file
[OUTPUT]: Shared test doubles, fixtures and polling helpers
[POS]:    Test infrastructure - shared across dashboard test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for coinpulse-dashboard tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use coinpulse_adapter::ws::{ErrorHandler, HandlerRegistry, MessageHandler, OpenHandler};
use coinpulse_adapter::{
    ApiKey, ContractAddress, HandlerId, MetadataResolver, MetadataSource, MobulaError,
    MobulaStream, Money, PriceUpdate, Result, Side, SnapshotSource, StreamTransport,
    TokenMetadata, Trade,
};
use coinpulse_dashboard::config::FeedSettings;
use coinpulse_dashboard::{Dashboard, LayoutStorage};
use parking_lot::Mutex;
use serde_json::{Value, json};
use uuid::Uuid;

pub const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
pub const WIF: &str = "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm";

pub fn test_api_key() -> ApiKey {
    ApiKey::new("test-key").expect("test api key")
}

/// Layout file under the temp dir, unique per call
pub fn temp_layout_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("coinpulse-test-{}", Uuid::new_v4()))
        .join("layout.json")
}

/// In-memory transport recording outbound messages
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    sent: Mutex<Vec<Value>>,
    messages: HandlerRegistry<MessageHandler>,
    errors: HandlerRegistry<ErrorHandler>,
    opens: HandlerRegistry<OpenHandler>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_frame(&self, frame: &Value) {
        self.messages.deliver(&frame.to_string());
    }

    pub fn sent_of(&self, kind: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|message| message.get("type").and_then(Value::as_str) == Some(kind))
            .cloned()
            .collect()
    }

    pub fn handler_count(&self) -> usize {
        self.messages.len()
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.opens.deliver();
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_json(&self, message: Value) {
        if self.is_connected() {
            self.sent.lock().push(message);
        }
    }

    fn on_message(&self, handler: MessageHandler) -> HandlerId {
        self.messages.insert(handler)
    }

    fn remove_message_handler(&self, id: HandlerId) -> bool {
        self.messages.remove(id)
    }

    fn on_error(&self, handler: ErrorHandler) -> HandlerId {
        self.errors.insert(handler)
    }

    fn remove_error_handler(&self, id: HandlerId) -> bool {
        self.errors.remove(id)
    }

    fn on_open(&self, handler: OpenHandler) -> HandlerId {
        self.opens.insert(handler)
    }

    fn remove_open_handler(&self, id: HandlerId) -> bool {
        self.opens.remove(id)
    }
}

pub struct StaticMetadata;

#[async_trait]
impl MetadataSource for StaticMetadata {
    async fn fetch_metadata(&self, _address: &str) -> Result<TokenMetadata> {
        Ok(TokenMetadata {
            symbol: "BONK".to_string(),
            name: "Bonk".to_string(),
            decimals: 5,
            logo: None,
        })
    }
}

/// Snapshot source with a fixed price and trade history
pub struct ScriptedSnapshots {
    pub price_usd: f64,
    pub history: Vec<String>,
    pub fail: AtomicBool,
    pub price_calls: AtomicUsize,
    pub trade_calls: AtomicUsize,
}

impl ScriptedSnapshots {
    pub fn new(price_usd: f64, history: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            price_usd,
            history: history.iter().map(|hash| hash.to_string()).collect(),
            fail: AtomicBool::new(false),
            price_calls: AtomicUsize::new(0),
            trade_calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        let snapshots = Self::new(0.0, &[]);
        snapshots.fail.store(true, Ordering::SeqCst);
        snapshots
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MobulaError::Api {
                code: 500,
                message: "snapshot unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSnapshots {
    async fn price_snapshot(
        &self,
        address: &ContractAddress,
        metadata: &TokenMetadata,
    ) -> Result<PriceUpdate> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        PriceUpdate::new(
            address.clone(),
            metadata.clone(),
            self.price_usd,
            self.price_usd / 100.0,
            1.5,
            Utc::now(),
        )
    }

    async fn trade_snapshot(
        &self,
        address: &ContractAddress,
        metadata: &TokenMetadata,
        limit: usize,
    ) -> Result<Vec<Trade>> {
        self.trade_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.history
            .iter()
            .take(limit)
            .map(|hash| trade(address, metadata, hash))
            .collect()
    }
}

pub fn trade(address: &ContractAddress, metadata: &TokenMetadata, hash: &str) -> Result<Trade> {
    Trade::new(
        hash,
        address.clone(),
        metadata.clone(),
        "wallet-0",
        Money::usd(5.0)?,
        Side::Sell,
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        hash,
    )
}

pub fn price_frame(address: &str, price_usd: f64) -> Value {
    json!({
        "type": "buy",
        "tokenData": { "address": address, "priceUSD": price_usd, "priceToken": 0.01 }
    })
}

pub fn trade_frame(address: &str, hash: &str) -> Value {
    json!({
        "type": "buy",
        "date": 1_700_000_100,
        "hash": hash,
        "sender": "wallet-1",
        "token": address,
        "amountUsd": 42.0
    })
}

pub struct DashboardFixture {
    pub transport: Arc<MockTransport>,
    pub snapshots: Arc<ScriptedSnapshots>,
    pub layout_path: PathBuf,
    pub dashboard: Dashboard,
}

pub fn dashboard_fixture(snapshots: Arc<ScriptedSnapshots>) -> DashboardFixture {
    dashboard_fixture_at(snapshots, temp_layout_path())
}

pub fn dashboard_fixture_at(snapshots: Arc<ScriptedSnapshots>, layout_path: PathBuf) -> DashboardFixture {
    let transport = MockTransport::new();
    let resolver = Arc::new(MetadataResolver::new(Arc::new(StaticMetadata)));
    let stream = MobulaStream::new(
        transport.clone(),
        Arc::clone(&resolver),
        test_api_key(),
        "solana",
    );
    let feed = FeedSettings {
        flush_interval_ms: 20,
        ..FeedSettings::default()
    };
    let dashboard = Dashboard::new(
        snapshots.clone(),
        resolver,
        stream,
        LayoutStorage::new(layout_path.clone()),
        &feed,
    );
    DashboardFixture {
        transport,
        snapshots,
        layout_path,
        dashboard,
    }
}

/// Poll `condition` for up to five seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
