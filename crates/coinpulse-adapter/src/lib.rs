/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Mobula adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod http;
pub mod metadata;
pub mod types;
pub mod ws;

pub use auth::{API_KEY_ENV, ApiKey};

// Re-export commonly used types from http
pub use http::{ClientConfig, MobulaClient, MobulaError, Result, SnapshotSource};

pub use metadata::{MetadataResolver, MetadataSource};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    ConnectionState,
    HandlerId,
    MobulaStream,
    MobulaWebSocket,
    PriceService,
    StreamTransport,
    SubscriptionHandle,
    TradeService,
    WebSocketConfig,
};
