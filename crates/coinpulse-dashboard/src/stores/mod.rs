/*
[INPUT]:  Enriched price and trade events
[OUTPUT]: Client-side stores read by widgets
[POS]:    Store layer - module wiring
[UPDATE]: When adding a store
*/

pub mod price;
pub mod trade;

pub use price::PriceStore;
pub use trade::{MAX_TRADES_DISPLAY, TradeCache, TradeStore};
