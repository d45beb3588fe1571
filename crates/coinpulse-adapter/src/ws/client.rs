/*
[INPUT]:  WebSocket configuration and API key
[OUTPUT]: One shared stream connection with bounded reconnection
[POS]:    WebSocket layer - tokio-tungstenite transport implementation
[UPDATE]: When changing connection lifecycle or reconnect policy
*/

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::ApiKey;
use crate::http::{MobulaError, Result};
use crate::ws::message::{log_dropped_frame, log_outbound};
use crate::ws::transport::{
    ErrorHandler, HandlerId, HandlerRegistry, MessageHandler, OpenHandler, StreamTransport,
};

/// Mobula streaming endpoint
pub const STREAM_URL: &str = "wss://api.mobula.io";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Stream connection settings
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub url: String,
    pub reconnect: bool,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: STREAM_URL.to_string(),
            reconnect: true,
            reconnect_interval: Duration::from_millis(3000),
            max_reconnect_attempts: 5,
        }
    }
}

impl WebSocketConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

struct ConnectionSlot {
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
    /// Bumped on every open and every explicit disconnect
    generation: u64,
    retry_count: u32,
    next_ticket: u64,
    reconnect: Option<(u64, JoinHandle<()>)>,
}

struct Shared {
    endpoint: Url,
    config: WebSocketConfig,
    slot: Mutex<ConnectionSlot>,
    connect_lock: tokio::sync::Mutex<()>,
    messages: HandlerRegistry<MessageHandler>,
    errors: HandlerRegistry<ErrorHandler>,
    opens: HandlerRegistry<OpenHandler>,
    state_tx: watch::Sender<ConnectionState>,
}

/// WebSocket transport for the Mobula stream.
///
/// Cheap to clone; every clone drives the same connection.
#[derive(Clone)]
pub struct MobulaWebSocket {
    shared: Arc<Shared>,
}

impl MobulaWebSocket {
    pub fn new(config: WebSocketConfig, api_key: &ApiKey) -> Result<Self> {
        let mut endpoint = Url::parse(&config.url)?;
        endpoint
            .query_pairs_mut()
            .append_pair("apiKey", api_key.expose());

        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            shared: Arc::new(Shared {
                endpoint,
                config,
                slot: Mutex::new(ConnectionSlot {
                    outbound: None,
                    generation: 0,
                    retry_count: 0,
                    next_ticket: 0,
                    reconnect: None,
                }),
                connect_lock: tokio::sync::Mutex::new(()),
                messages: HandlerRegistry::new(),
                errors: HandlerRegistry::new(),
                opens: HandlerRegistry::new(),
                state_tx,
            }),
        })
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Reconnect attempts since the last successful open
    pub fn retry_count(&self) -> u32 {
        self.shared.slot.lock().retry_count
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.shared.slot.lock().reconnect.is_some()
    }
}

impl std::fmt::Debug for MobulaWebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MobulaWebSocket")
            .field("host", &self.shared.endpoint.host_str())
            .field("state", &self.state())
            .finish()
    }
}

#[async_trait]
impl StreamTransport for MobulaWebSocket {
    async fn connect(&self) -> Result<()> {
        self.shared.connect(None).await
    }

    async fn disconnect(&self) {
        self.shared.disconnect().await;
    }

    fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    fn send_json(&self, message: Value) {
        let outbound = self.shared.slot.lock().outbound.clone();
        let Some(outbound) = outbound else {
            let kind = message.get("type").and_then(Value::as_str).unwrap_or("unknown");
            warn!(kind, "ws not connected; message dropped");
            return;
        };

        log_outbound(&message);
        if outbound.send(WsMessage::Text(message.to_string().into())).is_err() {
            warn!("ws send channel closed; message dropped");
        }
    }

    fn on_message(&self, handler: MessageHandler) -> HandlerId {
        self.shared.messages.insert(handler)
    }

    fn remove_message_handler(&self, id: HandlerId) -> bool {
        self.shared.messages.remove(id)
    }

    fn on_error(&self, handler: ErrorHandler) -> HandlerId {
        self.shared.errors.insert(handler)
    }

    fn remove_error_handler(&self, id: HandlerId) -> bool {
        self.shared.errors.remove(id)
    }

    fn on_open(&self, handler: OpenHandler) -> HandlerId {
        self.shared.opens.insert(handler)
    }

    fn remove_open_handler(&self, id: HandlerId) -> bool {
        self.shared.opens.remove(id)
    }
}

impl Shared {
    fn is_connected(&self) -> bool {
        self.slot
            .lock()
            .outbound
            .as_ref()
            .is_some_and(|outbound| !outbound.is_closed())
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// `expected_generation` is set by reconnect timers; a disconnect in
    /// between makes the attempt a no-op.
    async fn connect(self: &Arc<Self>, expected_generation: Option<u64>) -> Result<()> {
        let _guard = self.connect_lock.lock().await;

        if let Some(expected) = expected_generation
            && self.slot.lock().generation != expected
        {
            debug!("ws reconnect superseded");
            return Ok(());
        }
        if self.is_connected() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        let host = self.endpoint.host_str().unwrap_or_default().to_string();

        let socket = match connect_async(self.endpoint.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(err) => {
                let err = MobulaError::WebSocket(format!("connect to {host} failed: {err}"));
                self.errors.deliver(&err);
                self.set_state(ConnectionState::Disconnected);
                return Err(err);
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (generation, stale) = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            slot.outbound = Some(outbound_tx);
            slot.retry_count = 0;
            (slot.generation, slot.reconnect.take())
        };
        // No reconnect timer outlives a successful open.
        if let Some((_, task)) = stale {
            task.abort();
            debug!("ws pending reconnect cancelled by open");
        }

        self.set_state(ConnectionState::Connected);
        info!(host = %host, generation, "ws connected");

        tokio::spawn(run_connection(
            Arc::clone(self),
            socket,
            outbound_rx,
            generation,
        ));

        self.opens.deliver();
        Ok(())
    }

    async fn disconnect(&self) {
        let _guard = self.connect_lock.lock().await;

        let (outbound, reconnect) = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            (slot.outbound.take(), slot.reconnect.take())
        };

        if let Some((_, task)) = reconnect {
            task.abort();
            debug!("ws pending reconnect cancelled");
        }
        // Dropping the sender makes the I/O task send Close and exit.
        if outbound.is_some() {
            info!("ws disconnected");
        }
        drop(outbound);

        self.set_state(ConnectionState::Disconnected);
    }

    fn on_connection_closed(self: &Arc<Self>, generation: u64, reason: String) {
        {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                return;
            }
            slot.outbound = None;
        }

        warn!(reason = %reason, generation, "ws connection lost");
        self.set_state(ConnectionState::Disconnected);
        self.errors.deliver(&MobulaError::WebSocket(reason));
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let mut slot = self.slot.lock();
        if slot.reconnect.is_some() || slot.outbound.is_some() {
            return;
        }

        if !self.config.reconnect {
            drop(slot);
            self.set_state(ConnectionState::Disconnected);
            info!("ws reconnect disabled");
            return;
        }

        if slot.retry_count >= self.config.max_reconnect_attempts {
            let attempts = slot.retry_count;
            drop(slot);
            self.set_state(ConnectionState::Disconnected);
            warn!(attempts, "ws reconnect attempts exhausted");
            return;
        }

        slot.retry_count += 1;
        slot.next_ticket += 1;
        let attempt = slot.retry_count;
        let ticket = slot.next_ticket;
        let generation = slot.generation;
        let delay = self.config.reconnect_interval;

        // Published before the timer exists so a fast reconnect cannot be
        // overwritten by this state.
        self.set_state(ConnectionState::Reconnecting { attempt });

        let shared = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut slot = shared.slot.lock();
                match &slot.reconnect {
                    Some((current, _)) if *current == ticket => slot.reconnect = None,
                    _ => return,
                }
            }

            info!(attempt, "ws reconnecting");
            if let Err(err) = shared.connect(Some(generation)).await {
                warn!(attempt, error = %err, "ws reconnect attempt failed");
                shared.schedule_reconnect();
            }
        });
        slot.reconnect = Some((ticket, task));

        info!(attempt, delay_ms = delay.as_millis() as u64, "ws reconnect scheduled");
    }
}

async fn run_connection(
    shared: Arc<Shared>,
    socket: Socket,
    mut outbound_rx: mpsc::UnboundedReceiver<WsMessage>,
    generation: u64,
) {
    let (mut write, mut read) = socket.split();

    let reason = loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(message) => {
                        if let Err(err) = write.send(message).await {
                            break format!("send failed: {err}");
                        }
                    }
                    None => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break "closed locally".to_string();
                    }
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => shared.messages.deliver(text.as_str()),
                    Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => shared.messages.deliver(text),
                        Err(_) => log_dropped_frame("binary frame is not utf-8", bytes.len()),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break match frame {
                            Some(frame) => format!(
                                "closed by server: {} {}",
                                u16::from(frame.code),
                                frame.reason.as_str()
                            ),
                            None => "closed by server".to_string(),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break format!("read failed: {err}"),
                    None => break "stream ended".to_string(),
                }
            }
        }
    };

    debug!(generation, reason = %reason, "ws io task finished");
    shared.on_connection_closed(generation, reason);
}
