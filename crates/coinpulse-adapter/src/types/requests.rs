/*
[INPUT]:  Aggregated subscription targets and API key
[OUTPUT]: Outbound stream messages serialized with serde
[POS]:    Data layer - stream request schemas
[UPDATE]: When the stream subscription protocol changes
*/

use serde::{Deserialize, Serialize};

/// Stream category name for price (token-details) subscriptions
pub const TOKEN_DETAILS_TYPE: &str = "token-details";
/// Stream category name for trade (fast-trade) subscriptions
pub const FAST_TRADE_TYPE: &str = "fast-trade";
/// Message type used to drop every subscription of a category
pub const UNSUBSCRIBE_TYPE: &str = "unsubscribe";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAsset {
    pub blockchain: String,
    pub address: String,
}

impl StreamAsset {
    pub fn many(blockchain: &str, addresses: &[String]) -> Vec<Self> {
        addresses
            .iter()
            .map(|address| Self {
                blockchain: blockchain.to_string(),
                address: address.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDetailsPayload {
    pub tokens: Vec<StreamAsset>,
    pub subscription_tracking: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FastTradePayload {
    pub asset_mode: bool,
    pub items: Vec<StreamAsset>,
    pub subscription_tracking: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribePayload {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Envelope shared by every outbound stream message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest<P> {
    #[serde(rename = "type")]
    pub kind: String,
    pub authorization: String,
    pub payload: P,
}

impl StreamRequest<TokenDetailsPayload> {
    pub fn token_details(authorization: &str, tokens: Vec<StreamAsset>) -> Self {
        Self {
            kind: TOKEN_DETAILS_TYPE.to_string(),
            authorization: authorization.to_string(),
            payload: TokenDetailsPayload {
                tokens,
                subscription_tracking: true,
            },
        }
    }
}

impl StreamRequest<FastTradePayload> {
    pub fn fast_trade(authorization: &str, items: Vec<StreamAsset>) -> Self {
        Self {
            kind: FAST_TRADE_TYPE.to_string(),
            authorization: authorization.to_string(),
            payload: FastTradePayload {
                asset_mode: true,
                items,
                subscription_tracking: true,
            },
        }
    }
}

impl StreamRequest<UnsubscribePayload> {
    pub fn unsubscribe(authorization: &str, category: &str) -> Self {
        Self {
            kind: UNSUBSCRIBE_TYPE.to_string(),
            authorization: authorization.to_string(),
            payload: UnsubscribePayload {
                kind: category.to_string(),
            },
        }
    }
}
