/*
[INPUT]:  Mobula REST JSON bodies
[OUTPUT]: Typed response payloads (market data, trade history, metadata)
[POS]:    Data layer - REST response schemas
[UPDATE]: When API schema changes or new endpoints are added
*/

use serde::{Deserialize, Serialize};

/// Every Mobula REST response wraps its payload in `data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
}

/// GET /market/data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price_change_24h: Option<f64>,
    #[serde(default)]
    pub price_24h_ago: Option<f64>,
    #[serde(default)]
    pub volume_24h: Option<f64>,
    #[serde(default)]
    pub liquidity: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

impl MarketData {
    /// 24h variation in percent.
    ///
    /// `price_change_24h` is usually already a percentage; values of 1000 or
    /// more are treated as an absolute change.
    pub fn variation_24h(&self) -> f64 {
        let current = self.price.unwrap_or(0.0);

        if let Some(change) = self.price_change_24h
            && change.is_finite()
            && change.abs() < 1000.0
        {
            return change;
        }

        if let Some(previous) = self.price_24h_ago
            && previous.is_finite()
            && previous > 0.0
        {
            return (current - previous) / previous * 100.0;
        }

        if let Some(change) = self.price_change_24h
            && change.is_finite()
        {
            let previous = current - change;
            if previous > 0.0 {
                return change / previous * 100.0;
            }
        }

        0.0
    }
}

/// One entry of GET /market/trades/pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeHistoryItem {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub amount_usd: Option<f64>,
    #[serde(default)]
    pub token_amount: Option<f64>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Epoch seconds
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub blockchain: Option<String>,
}

/// GET /metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadataResponse {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub decimals: u32,
    #[serde(default)]
    pub logo: Option<String>,
}
