/*
[INPUT]:  Public API exports for coinpulse-dashboard crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod dashboard;
pub mod feed;
pub mod layout;
pub mod stores;

// Re-export main types for convenience
pub use config::DashboardConfig;
pub use dashboard::Dashboard;
pub use feed::{FeedHandle, FeedKind, spawn_flush_loop};
pub use layout::{LayoutStorage, Position, Widget, WidgetKind, WidgetLayout};
pub use stores::{PriceStore, TradeCache, TradeStore};
