/*
[INPUT]:  Raw frame, error and open observers
[OUTPUT]: StreamTransport trait and the handler registry shared by implementations
[POS]:    WebSocket layer - transport seam between sockets and stream services
[UPDATE]: When the transport contract or handler delivery changes
*/

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, warn};

use crate::http::{MobulaError, Result};

pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&MobulaError) + Send + Sync>;
pub type OpenHandler = Arc<dyn Fn() + Send + Sync>;

/// Registration token; removing by id unregisters the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// One logical streaming connection shared by every stream service
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open the connection; a no-op when already connected
    async fn connect(&self) -> Result<()>;

    /// Close the connection and cancel any pending reconnect
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Serialize and send; logs and drops the message when not connected
    fn send_json(&self, message: Value);

    fn on_message(&self, handler: MessageHandler) -> HandlerId;
    fn remove_message_handler(&self, id: HandlerId) -> bool;

    fn on_error(&self, handler: ErrorHandler) -> HandlerId;
    fn remove_error_handler(&self, id: HandlerId) -> bool;

    /// Fires after every successful open, reconnects included
    fn on_open(&self, handler: OpenHandler) -> HandlerId;
    fn remove_open_handler(&self, id: HandlerId) -> bool;
}

/// Ordered handler list with monotonically increasing ids
pub struct HandlerRegistry<H> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(HandlerId, H)>>,
}

impl<H: Clone> HandlerRegistry<H> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, handler: H) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, handler));
        id
    }

    pub fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Copy of the current handlers in registration order.
    ///
    /// Delivery iterates the snapshot so handlers may register or remove
    /// handlers re-entrantly.
    pub fn snapshot(&self) -> Vec<H> {
        self.handlers
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }

    pub fn clear(&self) {
        self.handlers.lock().clear();
    }
}

impl<H: Clone> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry<MessageHandler> {
    pub fn deliver(&self, frame: &str) {
        let handlers = self.snapshot();
        if handlers.is_empty() {
            warn!(bytes = frame.len(), "ws frame arrived with no message handlers");
            return;
        }
        for handler in handlers {
            isolate("message", || handler(frame));
        }
    }
}

impl HandlerRegistry<ErrorHandler> {
    pub fn deliver(&self, err: &MobulaError) {
        for handler in self.snapshot() {
            isolate("error", || handler(err));
        }
    }
}

impl HandlerRegistry<OpenHandler> {
    pub fn deliver(&self) {
        for handler in self.snapshot() {
            isolate("open", || handler());
        }
    }
}

pub(crate) fn isolate(kind: &'static str, call: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(call)) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(kind, reason = %reason, "ws handler panicked");
    }
}
