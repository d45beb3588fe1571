/*
[INPUT]:  token-details frames (buy/sell frames carrying tokenData)
[OUTPUT]: PriceUpdate events per subscribed token
[POS]:    WebSocket layer - price stream category
[UPDATE]: When the token-details frame layout changes
*/

use chrono::Utc;
use serde_json::Value;

use crate::http::{MobulaError, Result};
use crate::types::{
    ContractAddress, NATIVE_SOL_ADDRESS, PriceUpdate, StreamAsset, StreamRequest,
    TOKEN_DETAILS_TYPE, TokenMetadata,
};
use crate::ws::parsers;
use crate::ws::service::{StreamCategory, SubscriptionService};

/// Price (token-details) stream category
pub struct PriceStream;

pub type PriceService = SubscriptionService<PriceStream>;

/// Price values extracted from a token-details frame
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrice {
    pub target: String,
    pub price_usd: f64,
    pub price_sol: Option<f64>,
    pub variation_24h: f64,
}

impl StreamCategory for PriceStream {
    type Update = RawPrice;
    type Event = PriceUpdate;

    const NAME: &'static str = TOKEN_DETAILS_TYPE;

    fn subscription_request(api_key: &str, blockchain: &str, targets: &[String]) -> Result<Value> {
        let request = StreamRequest::token_details(api_key, StreamAsset::many(blockchain, targets));
        Ok(serde_json::to_value(request)?)
    }

    fn decode(frame: &Value) -> Result<Option<RawPrice>> {
        if parsers::trade_side(frame).is_none() {
            return Ok(None);
        }
        let Some(token_data) = parsers::price_fields(frame) else {
            return Ok(None);
        };

        let target = parsers::price_target(frame).ok_or_else(|| {
            MobulaError::InvalidMessage("token-details frame has no token address".to_string())
        })?;
        let price_usd = parsers::price_usd(token_data).ok_or_else(|| {
            MobulaError::InvalidMessage(format!("no usable USD price for {target}"))
        })?;

        let price_sol = if target.eq_ignore_ascii_case(NATIVE_SOL_ADDRESS) {
            Some(1.0)
        } else {
            parsers::price_sol(token_data)
        };

        Ok(Some(RawPrice {
            target: target.to_string(),
            price_usd,
            price_sol,
            variation_24h: parsers::variation_24h(token_data),
        }))
    }

    fn target(update: &RawPrice) -> &str {
        &update.target
    }

    fn build_event(
        update: &RawPrice,
        address: &ContractAddress,
        metadata: &TokenMetadata,
    ) -> Result<PriceUpdate> {
        PriceUpdate::new(
            address.clone(),
            metadata.clone(),
            update.price_usd,
            update.price_sol.unwrap_or(0.0),
            update.variation_24h,
            Utc::now(),
        )
    }
}
