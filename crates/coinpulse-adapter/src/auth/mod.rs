/*
[INPUT]:  Raw API key material (explicit value or environment)
[OUTPUT]: Validated credential embedded in REST headers and stream messages
[POS]:    Auth layer - credential handling
[UPDATE]: When changing how credentials are sourced
*/

pub mod api_key;

pub use api_key::{ApiKey, API_KEY_ENV};
