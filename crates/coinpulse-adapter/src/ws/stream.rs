/*
[INPUT]:  Transport, metadata resolver, API key
[OUTPUT]: MobulaStream facade owning the price and trade services
[POS]:    WebSocket layer - composition root for the stream subsystem
[UPDATE]: When adding stream categories or changing teardown
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::auth::ApiKey;
use crate::http::{MobulaError, Result};
use crate::metadata::MetadataResolver;
use crate::ws::client::{MobulaWebSocket, WebSocketConfig};
use crate::ws::price::PriceService;
use crate::ws::trade::TradeService;
use crate::ws::transport::{HandlerId, StreamTransport};

/// Price and trade services sharing one transport.
///
/// Both services re-install their handler and resend their aggregated set
/// after every successful open, reconnects included.
pub struct MobulaStream {
    transport: Arc<dyn StreamTransport>,
    prices: PriceService,
    trades: TradeService,
    open_hooks: Mutex<Vec<HandlerId>>,
    error_hooks: Mutex<Vec<HandlerId>>,
    closed: AtomicBool,
}

impl MobulaStream {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        resolver: Arc<MetadataResolver>,
        api_key: ApiKey,
        blockchain: &str,
    ) -> Self {
        let prices = PriceService::new(
            Arc::clone(&transport),
            Arc::clone(&resolver),
            api_key.clone(),
            blockchain,
        );
        let trades = TradeService::new(Arc::clone(&transport), resolver, api_key, blockchain);

        let open_hooks = vec![
            transport.on_open(prices.resync_hook()),
            transport.on_open(trades.resync_hook()),
        ];

        Self {
            transport,
            prices,
            trades,
            open_hooks: Mutex::new(open_hooks),
            error_hooks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Facade over a real Mobula WebSocket
    pub fn mobula(
        config: WebSocketConfig,
        api_key: ApiKey,
        resolver: Arc<MetadataResolver>,
        blockchain: &str,
    ) -> Result<Self> {
        let transport: Arc<dyn StreamTransport> = Arc::new(MobulaWebSocket::new(config, &api_key)?);
        Ok(Self::new(transport, resolver, api_key, blockchain))
    }

    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn prices(&self) -> &PriceService {
        &self.prices
    }

    pub fn trades(&self) -> &TradeService {
        &self.trades
    }

    pub fn transport(&self) -> &Arc<dyn StreamTransport> {
        &self.transport
    }

    /// Observe transport errors until `cleanup`
    pub fn on_error(&self, handler: impl Fn(&MobulaError) + Send + Sync + 'static) -> HandlerId {
        let id = self.transport.on_error(Arc::new(handler));
        self.error_hooks.lock().push(id);
        id
    }

    /// Drop every subscription and close the connection; safe to repeat
    pub async fn cleanup(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("stream already cleaned up");
            return;
        }

        self.prices.unsubscribe_all();
        self.trades.unsubscribe_all();

        let open_hooks = std::mem::take(&mut *self.open_hooks.lock());
        for id in open_hooks {
            self.transport.remove_open_handler(id);
        }
        let error_hooks = std::mem::take(&mut *self.error_hooks.lock());
        for id in error_hooks {
            self.transport.remove_error_handler(id);
        }

        self.transport.disconnect().await;
        info!("stream cleaned up");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
