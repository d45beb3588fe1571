/*
[INPUT]:  Contract address and a metadata source (REST client in production)
[OUTPUT]: TokenMetadata, fetched at most once per address per process
[POS]:    Metadata layer - resolver and cache
[UPDATE]: When changing fallback records or cache semantics
*/

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::http::Result;
use crate::types::{NATIVE_SOL_ADDRESS, TokenMetadata};

/// Network lookup behind the resolver cache
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_metadata(&self, address: &str) -> Result<TokenMetadata>;
}

type Slot = Arc<OnceCell<TokenMetadata>>;

/// Memoizing metadata lookup.
///
/// Successful and failed lookups are both cached forever; concurrent first
/// lookups of one address share a single fetch.
pub struct MetadataResolver {
    source: Arc<dyn MetadataSource>,
    cache: Mutex<HashMap<String, Slot>>,
}

impl MetadataResolver {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, address: &str) -> TokenMetadata {
        let address = address.trim();
        let key = address.to_ascii_lowercase();
        if is_native_key(&key) {
            return TokenMetadata::native_sol();
        }

        let slot = self.slot(key);
        slot.get_or_init(|| async {
            match self.source.fetch_metadata(address).await {
                Ok(metadata) => {
                    debug!(address, symbol = %metadata.symbol, "metadata resolved");
                    metadata
                }
                Err(err) => {
                    warn!(address, error = %err, "metadata lookup failed; caching fallback");
                    TokenMetadata::unknown()
                }
            }
        })
        .await
        .clone()
    }

    /// Synchronous peek at an already resolved record
    pub fn cached(&self, address: &str) -> Option<TokenMetadata> {
        let key = address.trim().to_ascii_lowercase();
        if is_native_key(&key) {
            return Some(TokenMetadata::native_sol());
        }
        self.cache.lock().get(&key).and_then(|slot| slot.get().cloned())
    }

    /// Warm the cache in a detached task
    pub fn prefetch(self: &Arc<Self>, address: &str) {
        if self.cached(address).is_some() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(address, "no tokio runtime; metadata prefetch skipped");
            return;
        };

        let resolver = Arc::clone(self);
        let address = address.to_string();
        handle.spawn(async move {
            resolver.resolve(&address).await;
        });
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    fn slot(&self, key: String) -> Slot {
        let mut cache = self.cache.lock();
        Arc::clone(cache.entry(key).or_default())
    }
}

fn is_native_key(key: &str) -> bool {
    key.eq_ignore_ascii_case(NATIVE_SOL_ADDRESS)
}
