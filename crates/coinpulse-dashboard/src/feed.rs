/*
[INPUT]:  Trade store, stream subscription handles, cancellation tokens
[OUTPUT]: Periodic pending-trade flushing and closable feed handles
[POS]:    Feed layer - lifetime of one widget's live data
[UPDATE]: When changing flush cadence or feed teardown
*/

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use coinpulse_adapter::{ContractAddress, SubscriptionHandle};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::stores::TradeStore;

const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Price,
    Trades,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Price => write!(f, "price"),
            Self::Trades => write!(f, "trades"),
        }
    }
}

/// Flush `address`'s pending trades every `period` until `shutdown`, then
/// flush once more
pub fn spawn_flush_loop(
    store: Arc<TradeStore>,
    address: ContractAddress,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(MIN_FLUSH_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    store.flush_pending(&address);
                }
            }
        }

        let added = store.flush_pending(&address);
        debug!(%address, added, "flush loop stopped");
    })
}

/// Live subscription of one widget
pub struct FeedHandle {
    kind: FeedKind,
    address: ContractAddress,
    subscription: Option<SubscriptionHandle>,
    shutdown: CancellationToken,
    flush_task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn price(address: ContractAddress, subscription: SubscriptionHandle) -> Self {
        Self {
            kind: FeedKind::Price,
            address,
            subscription: Some(subscription),
            shutdown: CancellationToken::new(),
            flush_task: None,
        }
    }

    pub fn trades(
        address: ContractAddress,
        subscription: SubscriptionHandle,
        shutdown: CancellationToken,
        flush_task: JoinHandle<()>,
    ) -> Self {
        Self {
            kind: FeedKind::Trades,
            address,
            subscription: Some(subscription),
            shutdown,
            flush_task: Some(flush_task),
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn address(&self) -> &ContractAddress {
        &self.address
    }

    /// Unsubscribe, stop the flush loop and wait for its final flush
    pub async fn close(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.shutdown.cancel();
        if let Some(task) = self.flush_task.take()
            && let Err(err) = task.await
        {
            warn!(kind = %self.kind, address = %self.address, error = %err, "flush task failed");
        }
        debug!(kind = %self.kind, address = %self.address, "feed closed");
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedHandle")
            .field("kind", &self.kind)
            .field("address", &self.address)
            .finish()
    }
}
