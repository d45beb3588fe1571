/*
[INPUT]:  Snapshot source, stream facade, stores, layout storage
[OUTPUT]: Dashboard driving one live feed per widget
[POS]:    Application layer - composition root for widgets and feeds
[UPDATE]: When adding widget kinds or changing feed lifecycle
*/

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use coinpulse_adapter::{
    ContractAddress, MetadataResolver, MobulaClient, MobulaStream, MobulaWebSocket,
    SnapshotSource, StreamTransport,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DashboardConfig, FeedSettings, WidgetSeed};
use crate::feed::{FeedHandle, spawn_flush_loop};
use crate::layout::{LayoutStorage, Position, Widget, WidgetKind, WidgetLayout};
use crate::stores::{PriceStore, TradeStore};

/// Headless dashboard: widgets, their feeds and the stores they fill.
///
/// Constructed once and shared by handle; nothing here is global.
pub struct Dashboard {
    snapshots: Arc<dyn SnapshotSource>,
    resolver: Arc<MetadataResolver>,
    stream: MobulaStream,
    prices: Arc<PriceStore>,
    trades: Arc<TradeStore>,
    layout: Mutex<WidgetLayout>,
    storage: LayoutStorage,
    feeds: Mutex<HashMap<Uuid, FeedHandle>>,
    flush_interval: Duration,
    closed: AtomicBool,
}

impl Dashboard {
    pub fn new(
        snapshots: Arc<dyn SnapshotSource>,
        resolver: Arc<MetadataResolver>,
        stream: MobulaStream,
        storage: LayoutStorage,
        feed: &FeedSettings,
    ) -> Self {
        Self {
            snapshots,
            resolver,
            stream,
            prices: Arc::new(PriceStore::new()),
            trades: Arc::new(TradeStore::new(feed.max_trades_display)),
            layout: Mutex::new(WidgetLayout::new()),
            storage,
            feeds: Mutex::new(HashMap::new()),
            flush_interval: feed.flush_interval(),
            closed: AtomicBool::new(false),
        }
    }

    /// Dashboard over the live Mobula API; the returned transport handle
    /// exposes connection state
    pub fn mobula(config: &DashboardConfig, layout_path: PathBuf) -> Result<(Self, MobulaWebSocket)> {
        let api_key = config.api_key()?;
        let client = Arc::new(
            MobulaClient::with_config(
                config.api.to_client_config(&config.feed.blockchain),
                api_key.clone(),
            )
            .context("build mobula client")?,
        );
        let resolver = Arc::new(MetadataResolver::new(client.clone()));

        let websocket = MobulaWebSocket::new(config.stream.to_websocket_config(), &api_key)
            .context("build stream transport")?;
        let transport: Arc<dyn StreamTransport> = Arc::new(websocket.clone());
        let stream = MobulaStream::new(
            transport,
            Arc::clone(&resolver),
            api_key,
            &config.feed.blockchain,
        );

        let dashboard = Self::new(
            client,
            resolver,
            stream,
            LayoutStorage::new(layout_path),
            &config.feed,
        );
        Ok((dashboard, websocket))
    }

    pub fn prices(&self) -> &Arc<PriceStore> {
        &self.prices
    }

    pub fn trades(&self) -> &Arc<TradeStore> {
        &self.trades
    }

    pub fn stream(&self) -> &MobulaStream {
        &self.stream
    }

    pub fn storage(&self) -> &LayoutStorage {
        &self.storage
    }

    pub async fn widgets(&self) -> Vec<Widget> {
        self.layout.lock().await.widgets().to_vec()
    }

    pub async fn feed_count(&self) -> usize {
        self.feeds.lock().await.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Load the saved layout, placing `seeds` when nothing was saved.
    ///
    /// Returns the number of widgets.
    pub async fn restore_layout(&self, seeds: &[WidgetSeed]) -> Result<usize> {
        let restored = self.storage.load().await;
        let mut layout = self.layout.lock().await;
        *layout = restored;

        if layout.is_empty() && !seeds.is_empty() {
            for seed in seeds {
                let address = match ContractAddress::new(&seed.contract_address) {
                    Ok(address) => address,
                    Err(err) => {
                        warn!(address = %seed.contract_address, error = %err, "seed widget skipped");
                        continue;
                    }
                };
                if let Err(err) = layout.add(seed.kind, address, seed.position) {
                    warn!(error = %err, "seed widgets truncated");
                    break;
                }
            }
            self.storage
                .save(&layout)
                .await
                .context("persist seeded layout")?;
            info!(widgets = layout.len(), "layout seeded from config");
        }
        Ok(layout.len())
    }

    /// Open a feed for every widget, then connect the stream
    pub async fn start(&self) -> Result<()> {
        self.ensure_open()?;
        for widget in self.widgets().await {
            self.open_feed(&widget).await;
        }
        self.stream.connect().await.context("connect stream")?;
        info!(feeds = self.feed_count().await, "dashboard started");
        Ok(())
    }

    /// Seed the price store from REST, then follow the price stream
    pub async fn track_price(&self, address: &ContractAddress) -> FeedHandle {
        let metadata = self.resolver.resolve(address.as_str()).await;
        match self.snapshots.price_snapshot(address, &metadata).await {
            Ok(update) => {
                self.prices.set_price(update);
            }
            Err(err) => warn!(%address, error = %err, "price snapshot failed; waiting for stream"),
        }

        let prices = Arc::clone(&self.prices);
        let subscription = self.stream.prices().subscribe(address, move |update| {
            prices.set_price(update);
        });
        FeedHandle::price(address.clone(), subscription)
    }

    /// Seed the trade store from REST, then buffer streamed trades and flush
    /// them periodically
    pub async fn track_trades(&self, address: &ContractAddress) -> FeedHandle {
        let metadata = self.resolver.resolve(address.as_str()).await;
        match self
            .snapshots
            .trade_snapshot(address, &metadata, self.trades.limit())
            .await
        {
            Ok(trades) => self.trades.set_trades(address, trades),
            Err(err) => warn!(%address, error = %err, "trade snapshot failed; waiting for stream"),
        }

        let trades = Arc::clone(&self.trades);
        let target = address.clone();
        let subscription = self.stream.trades().subscribe(address, move |trade| {
            trades.add_trade(&target, trade);
        });

        let shutdown = CancellationToken::new();
        let flush_task = spawn_flush_loop(
            Arc::clone(&self.trades),
            address.clone(),
            self.flush_interval,
            shutdown.clone(),
        );
        FeedHandle::trades(address.clone(), subscription, shutdown, flush_task)
    }

    pub async fn add_widget(
        &self,
        kind: WidgetKind,
        contract_address: &str,
        position: Position,
    ) -> Result<Widget> {
        self.ensure_open()?;
        let address = ContractAddress::new(contract_address).context("invalid contract address")?;

        let widget = {
            let mut layout = self.layout.lock().await;
            let widget = layout.add(kind, address, position)?;
            if let Err(err) = self.storage.save(&layout).await {
                let _ = layout.remove(widget.id);
                return Err(err.context("persist layout"));
            }
            widget
        };
        info!(id = %widget.id, kind = %widget.kind, address = %widget.contract_address, "widget added");

        self.open_feed(&widget).await;
        Ok(widget)
    }

    pub async fn move_widget(&self, id: Uuid, position: Position) -> Result<()> {
        let mut layout = self.layout.lock().await;
        layout.move_widget(id, position)?;
        self.storage.save(&layout).await.context("persist layout")?;
        debug!(%id, x = position.x, y = position.y, "widget moved");
        Ok(())
    }

    pub async fn remove_widget(&self, id: Uuid) -> Result<Widget> {
        let widget = {
            let mut layout = self.layout.lock().await;
            let widget = layout.remove(id)?;
            self.storage.save(&layout).await.context("persist layout")?;
            widget
        };

        let feed = self.feeds.lock().await.remove(&id);
        if let Some(feed) = feed {
            feed.close().await;
        }
        info!(%id, kind = %widget.kind, "widget removed");
        Ok(widget)
    }

    /// Close every feed and tear the stream down; safe to repeat
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("dashboard already shut down");
            return;
        }

        let feeds: Vec<FeedHandle> = self.feeds.lock().await.drain().map(|(_, feed)| feed).collect();
        let closed = feeds.len();
        for feed in feeds {
            feed.close().await;
        }
        self.stream.cleanup().await;
        info!(feeds = closed, "dashboard shut down");
    }

    async fn open_feed(&self, widget: &Widget) {
        if self.feeds.lock().await.contains_key(&widget.id) {
            return;
        }

        let feed = match widget.kind {
            WidgetKind::LivePrice => self.track_price(&widget.contract_address).await,
            WidgetKind::TradeFeed => self.track_trades(&widget.contract_address).await,
        };

        let still_placed = self.layout.lock().await.get(widget.id).is_some();
        let mut feeds = self.feeds.lock().await;
        if self.is_closed() || !still_placed || feeds.contains_key(&widget.id) {
            drop(feeds);
            feed.close().await;
            return;
        }
        debug!(id = %widget.id, kind = %feed.kind(), address = %feed.address(), "feed opened");
        feeds.insert(widget.id, feed);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(anyhow!("Dashboard is shut down"));
        }
        Ok(())
    }
}
