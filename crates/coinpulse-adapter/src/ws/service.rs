/*
[INPUT]:  Shared transport, metadata resolver, subscriber callbacks
[OUTPUT]: Typed, enriched stream events fanned out per target
[POS]:    WebSocket layer - generic subscription multiplexer
[UPDATE]: When changing subscription bookkeeping or dispatch rules
*/

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::ApiKey;
use crate::http::Result;
use crate::metadata::MetadataResolver;
use crate::types::{ContractAddress, StreamRequest, TokenMetadata};
use crate::ws::message::{frame_type, log_decode_failure, parse_frame, subscription_confirmation};
use crate::ws::transport::{HandlerId, OpenHandler, StreamTransport, isolate};

/// One logical stream category multiplexed over the shared transport
pub trait StreamCategory: Send + Sync + 'static {
    /// Decoded frame contents, before metadata enrichment
    type Update: Send + Sync + 'static;
    type Event: Send + 'static;

    /// Wire name of the category (`type` of subscribe messages)
    const NAME: &'static str;

    /// Aggregated request naming every target of interest
    fn subscription_request(api_key: &str, blockchain: &str, targets: &[String]) -> Result<Value>;

    /// `Ok(None)` for frames of other categories, `Err` for malformed frames
    /// of this one.
    fn decode(frame: &Value) -> Result<Option<Self::Update>>;

    fn target(update: &Self::Update) -> &str;

    fn build_event(
        update: &Self::Update,
        address: &ContractAddress,
        metadata: &TokenMetadata,
    ) -> Result<Self::Event>;
}

pub type EventCallback<E> = Arc<dyn Fn(E) + Send + Sync>;

struct Entry<E> {
    address: ContractAddress,
    callback: EventCallback<E>,
}

impl<E> Clone for Entry<E> {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

trait SubscriptionOwner: Send + Sync {
    fn release(&self, token: Uuid);
}

/// Returned by `subscribe`; `unsubscribe` removes the entry.
///
/// Dropping the handle keeps the subscription alive.
#[must_use = "dropping the handle leaves the subscription active"]
pub struct SubscriptionHandle {
    token: Uuid,
    owner: Weak<dyn SubscriptionOwner>,
}

impl SubscriptionHandle {
    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn unsubscribe(self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.release(self.token);
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("token", &self.token)
            .finish()
    }
}

struct ServiceInner<C: StreamCategory> {
    transport: Arc<dyn StreamTransport>,
    resolver: Arc<MetadataResolver>,
    api_key: ApiKey,
    blockchain: String,
    entries: Mutex<HashMap<Uuid, Entry<C::Event>>>,
    handler_id: Mutex<Option<HandlerId>>,
    _category: PhantomData<fn() -> C>,
}

/// Subscription service for one stream category.
///
/// Keeps the desired target set locally and re-sends it in full whenever it
/// changes; the server replaces its view on every message.
pub struct SubscriptionService<C: StreamCategory> {
    inner: Arc<ServiceInner<C>>,
}

impl<C: StreamCategory> Clone for SubscriptionService<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: StreamCategory> SubscriptionService<C> {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        resolver: Arc<MetadataResolver>,
        api_key: ApiKey,
        blockchain: impl Into<String>,
    ) -> Self {
        let service = Self {
            inner: Arc::new(ServiceInner {
                transport,
                resolver,
                api_key,
                blockchain: blockchain.into(),
                entries: Mutex::new(HashMap::new()),
                handler_id: Mutex::new(None),
                _category: PhantomData,
            }),
        };
        service.setup_handlers();
        service
    }

    /// (Re)install the frame handler, replacing any previous one
    pub fn setup_handlers(&self) {
        self.inner.setup_handlers();
    }

    pub fn subscribe(
        &self,
        address: &ContractAddress,
        callback: impl Fn(C::Event) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let token = Uuid::new_v4();
        self.inner.entries.lock().insert(
            token,
            Entry {
                address: address.clone(),
                callback: Arc::new(callback),
            },
        );
        debug!(category = C::NAME, %address, %token, "stream subscriber added");

        self.inner.resolver.prefetch(address.as_str());
        if self.inner.transport.is_connected() {
            self.inner.send_subscription();
        }

        let weak = Arc::downgrade(&self.inner);
        let owner: Weak<dyn SubscriptionOwner> = weak;
        SubscriptionHandle { token, owner }
    }

    /// Send the full aggregated target set; no-op when empty or disconnected
    pub fn send_subscription(&self) {
        self.inner.send_subscription();
    }

    pub fn unsubscribe_all(&self) {
        self.inner.unsubscribe_all();
    }

    /// Unique targets, deduplicated case-insensitively in sorted order
    pub fn targets(&self) -> Vec<String> {
        self.inner.targets()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn has_handler(&self) -> bool {
        self.inner.handler_id.lock().is_some()
    }

    /// Open hook re-running handler setup and resend after every connect
    pub(crate) fn resync_hook(&self) -> OpenHandler {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.setup_handlers();
                inner.send_subscription();
            }
        })
    }
}

impl<C: StreamCategory> ServiceInner<C> {
    fn setup_handlers(self: &Arc<Self>) {
        let mut handler_id = self.handler_id.lock();
        if let Some(previous) = handler_id.take() {
            self.transport.remove_message_handler(previous);
            debug!(category = C::NAME, %previous, "replacing stream handler");
        }

        let weak = Arc::downgrade(self);
        let id = self.transport.on_message(Arc::new(move |raw: &str| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_frame(raw);
            }
        }));
        *handler_id = Some(id);
    }

    fn targets(&self) -> Vec<String> {
        let entries = self.entries.lock();
        let mut unique = BTreeMap::new();
        for entry in entries.values() {
            unique
                .entry(entry.address.key())
                .or_insert_with(|| entry.address.as_str().to_string());
        }
        unique.into_values().collect()
    }

    fn send_subscription(&self) {
        if !self.transport.is_connected() {
            warn!(category = C::NAME, "not connected; subscription not sent");
            return;
        }

        let targets = self.targets();
        if targets.is_empty() {
            debug!(category = C::NAME, "no targets to subscribe");
            return;
        }

        match C::subscription_request(self.api_key.expose(), &self.blockchain, &targets) {
            Ok(message) => {
                info!(category = C::NAME, targets = targets.len(), "sending aggregated subscription");
                self.transport.send_json(message);
            }
            Err(err) => warn!(category = C::NAME, error = %err, "failed to build subscription"),
        }
    }

    fn unsubscribe_all(&self) {
        if self.transport.is_connected() {
            match serde_json::to_value(StreamRequest::unsubscribe(self.api_key.expose(), C::NAME)) {
                Ok(message) => self.transport.send_json(message),
                Err(err) => warn!(category = C::NAME, error = %err, "failed to build unsubscribe"),
            }
        }

        let dropped = {
            let mut entries = self.entries.lock();
            let dropped = entries.len();
            entries.clear();
            dropped
        };
        if let Some(id) = self.handler_id.lock().take() {
            self.transport.remove_message_handler(id);
        }
        debug!(category = C::NAME, dropped, "stream subscriptions cleared");
    }

    fn handle_frame(self: &Arc<Self>, raw: &str) {
        let frame = match parse_frame(raw) {
            Ok(frame) => frame,
            Err(err) => {
                log_decode_failure(C::NAME, &err, raw);
                return;
            }
        };

        if let Some(confirmation) = subscription_confirmation(&frame) {
            if confirmation.category == C::NAME {
                info!(
                    category = C::NAME,
                    subscription_id = confirmation.subscription_id.as_deref().unwrap_or("-"),
                    "stream subscription confirmed"
                );
            }
            return;
        }

        let update = match C::decode(&frame) {
            Ok(Some(update)) => update,
            Ok(None) => return,
            Err(err) => {
                warn!(
                    category = C::NAME,
                    kind = frame_type(&frame).as_deref().unwrap_or("-"),
                    error = %err,
                    "stream frame discarded"
                );
                return;
            }
        };

        let target = C::target(&update).to_string();
        if let Some(metadata) = self.resolver.cached(&target) {
            self.dispatch(&update, &target, &metadata);
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!(category = C::NAME, target = %target, "no tokio runtime; event dropped");
            return;
        };
        let inner = Arc::clone(self);
        handle.spawn(async move {
            let metadata = inner.resolver.resolve(&target).await;
            inner.dispatch(&update, &target, &metadata);
        });
    }

    fn dispatch(&self, update: &C::Update, target: &str, metadata: &TokenMetadata) {
        let matching: Vec<Entry<C::Event>> = self
            .entries
            .lock()
            .values()
            .filter(|entry| entry.address.matches(target))
            .cloned()
            .collect();

        if matching.is_empty() {
            debug!(category = C::NAME, target, "no subscribers for target");
            return;
        }

        for entry in matching {
            match C::build_event(update, &entry.address, metadata) {
                Ok(event) => isolate("subscriber", || (entry.callback)(event)),
                Err(err) => warn!(
                    category = C::NAME,
                    target,
                    error = %err,
                    "failed to build stream event"
                ),
            }
        }
    }
}

impl<C: StreamCategory> SubscriptionOwner for ServiceInner<C> {
    fn release(&self, token: Uuid) {
        let removed = self.entries.lock().remove(&token);
        if let Some(entry) = removed {
            debug!(category = C::NAME, address = %entry.address, %token, "stream subscriber removed");
            if self.transport.is_connected() {
                self.send_subscription();
            }
        }
    }
}
