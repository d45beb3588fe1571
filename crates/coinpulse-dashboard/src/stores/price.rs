/*
[INPUT]:  PriceUpdate events from snapshots and the price stream
[OUTPUT]: Latest price per target with watch-based change notification
[POS]:    Store layer - price cache
[UPDATE]: When changing price write policy
*/

use std::collections::HashMap;

use coinpulse_adapter::{ContractAddress, PriceUpdate};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

/// Latest price per target, one watch channel each.
///
/// Writes whose USD price equals the cached one are suppressed, so watchers
/// only wake on real changes.
#[derive(Debug, Default)]
pub struct PriceStore {
    channels: Mutex<HashMap<String, watch::Sender<Option<PriceUpdate>>>>,
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `update`; returns whether watchers were notified
    pub fn set_price(&self, update: PriceUpdate) -> bool {
        let key = update.contract_address.key();
        let mut channels = self.channels.lock();
        let sender = channels
            .entry(key)
            .or_insert_with(|| watch::channel(None).0);

        let changed = sender.send_if_modified(|current| {
            if let Some(existing) = current
                && existing.price_usd == update.price_usd
            {
                return false;
            }
            *current = Some(update);
            true
        });
        if !changed {
            trace!("price unchanged; write suppressed");
        }
        changed
    }

    pub fn get_price(&self, address: &ContractAddress) -> Option<PriceUpdate> {
        self.channels
            .lock()
            .get(&address.key())
            .and_then(|sender| sender.borrow().clone())
    }

    /// Receiver yielding the latest price of `address`, `None` until known
    pub fn watch(&self, address: &ContractAddress) -> watch::Receiver<Option<PriceUpdate>> {
        self.channels
            .lock()
            .entry(address.key())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    pub fn len(&self) -> usize {
        self.channels
            .lock()
            .values()
            .filter(|sender| sender.borrow().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached price; live watchers observe `None` and keep
    /// receiving later writes
    pub fn clear(&self) {
        let mut channels = self.channels.lock();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        for sender in channels.values() {
            sender.send_replace(None);
        }
    }
}
