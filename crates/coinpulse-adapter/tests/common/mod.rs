/*
[INPUT]:  Test scenarios needing a transport, a metadata source or a server
[OUTPUT]: Shared test doubles, fixtures and polling helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for coinpulse-adapter tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use coinpulse_adapter::ws::{ErrorHandler, HandlerRegistry, MessageHandler, OpenHandler};
use coinpulse_adapter::{
    ApiKey, HandlerId, MetadataResolver, MetadataSource, MobulaError, MobulaStream, Result,
    StreamTransport, TokenMetadata,
};
use parking_lot::Mutex;
use serde_json::Value;
use wiremock::MockServer;

pub const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
pub const WIF: &str = "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm";

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn test_api_key() -> ApiKey {
    ApiKey::new("test-key").expect("test api key")
}

/// In-memory transport recording outbound messages
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    connects: AtomicUsize,
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

    pub fn push_raw(&self, raw: &str) {
        self.messages.deliver(raw);
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().clone()
    }

    /// Outbound messages of one `type`
    pub fn sent_of(&self, kind: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|message| message.get("type").and_then(Value::as_str) == Some(kind))
            .cloned()
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    pub fn handler_count(&self) -> usize {
        self.messages.len()
    }

    pub fn open_handler_count(&self) -> usize {
        self.opens.len()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Simulate an unexpected close
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.errors
            .deliver(&MobulaError::WebSocket("connection reset".to_string()));
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
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

/// Metadata source answering from memory and counting lookups
pub struct CountingSource {
    pub calls: AtomicUsize,
    pub metadata: TokenMetadata,
}

impl CountingSource {
    pub fn bonk() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            metadata: TokenMetadata {
                symbol: "BONK".to_string(),
                name: "Bonk".to_string(),
                decimals: 5,
                logo: None,
            },
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for CountingSource {
    async fn fetch_metadata(&self, _address: &str) -> Result<TokenMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata.clone())
    }
}

pub struct StreamFixture {
    pub transport: Arc<MockTransport>,
    pub source: Arc<CountingSource>,
    pub resolver: Arc<MetadataResolver>,
    pub stream: MobulaStream,
}

pub fn stream_fixture() -> StreamFixture {
    let transport = MockTransport::new();
    let source = CountingSource::bonk();
    let resolver = Arc::new(MetadataResolver::new(source.clone()));
    let stream = MobulaStream::new(
        transport.clone(),
        Arc::clone(&resolver),
        test_api_key(),
        "solana",
    );
    StreamFixture {
        transport,
        source,
        resolver,
        stream,
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

/// Addresses named by an aggregated subscription message
pub fn subscribed_addresses(message: &Value) -> Vec<String> {
    let payload = &message["payload"];
    payload
        .get("tokens")
        .or_else(|| payload.get("items"))
        .and_then(Value::as_array)
        .map(|assets| {
            assets
                .iter()
                .filter_map(|asset| asset["address"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
