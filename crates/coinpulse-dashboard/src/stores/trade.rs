/*
[INPUT]:  Trade snapshots and streamed trade events
[OUTPUT]: Bounded, hash-unique newest-first trade lists per target
[POS]:    Store layer - trade cache with pending buffer
[UPDATE]: When changing trade dedup, limits or flush semantics
*/

use std::collections::{HashMap, HashSet};

use coinpulse_adapter::{ContractAddress, Trade};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

pub const MAX_TRADES_DISPLAY: usize = 20;

/// Trade lists plus per-target pending buffers.
///
/// Every list holds at most `limit` entries and never two with the same
/// transaction hash.
#[derive(Debug, Clone)]
pub struct TradeCache {
    limit: usize,
    trades: HashMap<String, Vec<Trade>>,
    pending: HashMap<String, Vec<Trade>>,
}

impl Default for TradeCache {
    fn default() -> Self {
        Self::new(MAX_TRADES_DISPLAY)
    }
}

impl TradeCache {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            trades: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Replace the list; first occurrence of a hash wins, order is kept
    pub fn set_trades(&mut self, key: &str, trades: Vec<Trade>) {
        let mut seen = HashSet::new();
        let unique: Vec<Trade> = trades
            .into_iter()
            .filter(|trade| seen.insert(trade.transaction_hash.clone()))
            .take(self.limit)
            .collect();
        self.trades.insert(key.to_string(), unique);
    }

    /// Buffer a streamed trade; `false` if its hash is already pending
    pub fn add_trade(&mut self, key: &str, trade: Trade) -> bool {
        let pending = self.pending.entry(key.to_string()).or_default();
        if pending
            .iter()
            .any(|existing| existing.transaction_hash == trade.transaction_hash)
        {
            return false;
        }
        pending.push(trade);
        true
    }

    /// Prepend pending trades not yet listed, then truncate.
    ///
    /// Returns how many were added. The pending buffer is always emptied.
    pub fn flush_pending(&mut self, key: &str) -> usize {
        let Some(pending) = self.pending.remove(key) else {
            return 0;
        };
        if pending.is_empty() {
            return 0;
        }

        let current = self.trades.remove(key).unwrap_or_default();
        let known: HashSet<&str> = current
            .iter()
            .map(|trade| trade.transaction_hash.as_str())
            .collect();
        let fresh: Vec<Trade> = pending
            .into_iter()
            .filter(|trade| !known.contains(trade.transaction_hash.as_str()))
            .collect();
        drop(known);

        let added = fresh.len();
        let merged = if added == 0 {
            current
        } else {
            let mut merged = fresh;
            merged.extend(current);
            merged.truncate(self.limit);
            merged
        };
        self.trades.insert(key.to_string(), merged);
        added
    }

    pub fn trades(&self, key: &str) -> &[Trade] {
        self.trades.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pending_len(&self, key: &str) -> usize {
        self.pending.get(key).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.trades.clear();
        self.pending.clear();
    }
}

/// Shared trade cache publishing each target's list through a watch channel
#[derive(Debug)]
pub struct TradeStore {
    cache: Mutex<TradeCache>,
    channels: Mutex<HashMap<String, watch::Sender<Vec<Trade>>>>,
}

impl Default for TradeStore {
    fn default() -> Self {
        Self::new(MAX_TRADES_DISPLAY)
    }
}

impl TradeStore {
    pub fn new(limit: usize) -> Self {
        Self {
            cache: Mutex::new(TradeCache::new(limit)),
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.cache.lock().limit()
    }

    pub fn set_trades(&self, address: &ContractAddress, trades: Vec<Trade>) {
        let key = address.key();
        let snapshot = {
            let mut cache = self.cache.lock();
            cache.set_trades(&key, trades);
            cache.trades(&key).to_vec()
        };
        debug!(%address, trades = snapshot.len(), "trade list replaced");
        self.publish(key, snapshot);
    }

    pub fn add_trade(&self, address: &ContractAddress, trade: Trade) -> bool {
        self.cache.lock().add_trade(&address.key(), trade)
    }

    /// Merge the pending buffer; watchers are notified only when trades were added
    pub fn flush_pending(&self, address: &ContractAddress) -> usize {
        let key = address.key();
        let (added, snapshot) = {
            let mut cache = self.cache.lock();
            let added = cache.flush_pending(&key);
            (added, (added > 0).then(|| cache.trades(&key).to_vec()))
        };
        if let Some(snapshot) = snapshot {
            debug!(%address, added, "pending trades flushed");
            self.publish(key, snapshot);
        }
        added
    }

    pub fn get_trades(&self, address: &ContractAddress) -> Vec<Trade> {
        self.cache.lock().trades(&address.key()).to_vec()
    }

    pub fn pending_len(&self, address: &ContractAddress) -> usize {
        self.cache.lock().pending_len(&address.key())
    }

    pub fn watch(&self, address: &ContractAddress) -> watch::Receiver<Vec<Trade>> {
        let key = address.key();
        let current = self.cache.lock().trades(&key).to_vec();
        self.channels
            .lock()
            .entry(key)
            .or_insert_with(|| watch::channel(current).0)
            .subscribe()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
        let mut channels = self.channels.lock();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        for sender in channels.values() {
            sender.send_replace(Vec::new());
        }
    }

    fn publish(&self, key: String, trades: Vec<Trade>) {
        let mut channels = self.channels.lock();
        match channels.get(&key) {
            Some(sender) => {
                sender.send_replace(trades);
            }
            None => {
                channels.insert(key, watch::channel(trades).0);
            }
        }
    }
}
