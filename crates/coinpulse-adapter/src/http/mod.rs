/*
[INPUT]:  HTTP client configuration and API endpoints
[OUTPUT]: HTTP responses and typed API results
[POS]:    HTTP layer - REST API communication
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod client;
pub mod error;
pub mod market;

pub use error::{MobulaError, Result};

pub use client::{ClientConfig, MobulaClient};
pub use market::SnapshotSource;
