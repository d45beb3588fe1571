/*
[INPUT]:  WebSocket configuration, subscriptions and raw stream frames
[OUTPUT]: Typed price and trade events over one shared connection
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding stream categories or changing connection logic
*/

pub mod client;
pub mod message;
pub mod parsers;
pub mod price;
pub mod service;
pub mod stream;
pub mod trade;
pub mod transport;

pub use client::{ConnectionState, MobulaWebSocket, STREAM_URL, WebSocketConfig};
pub use message::{SubscriptionConfirmation, parse_frame, subscription_confirmation};
pub use price::{PriceService, PriceStream, RawPrice};
pub use service::{EventCallback, StreamCategory, SubscriptionHandle, SubscriptionService};
pub use stream::MobulaStream;
pub use trade::{RawTrade, TradeService, TradeStream};
pub use transport::{
    ErrorHandler, HandlerId, HandlerRegistry, MessageHandler, OpenHandler, StreamTransport,
};
