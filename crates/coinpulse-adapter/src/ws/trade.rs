/*
[INPUT]:  fast-trade frames (flat buy/sell frames)
[OUTPUT]: Trade events per subscribed token
[POS]:    WebSocket layer - trade stream category
[UPDATE]: When the fast-trade frame layout changes
*/

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::http::{MobulaError, Result};
use crate::types::{
    ContractAddress, FAST_TRADE_TYPE, Money, Side, StreamAsset, StreamRequest, TokenMetadata, Trade,
};
use crate::ws::parsers;
use crate::ws::service::{StreamCategory, SubscriptionService};

/// Trade (fast-trade) stream category
pub struct TradeStream;

pub type TradeService = SubscriptionService<TradeStream>;

#[derive(Debug, Clone, PartialEq)]
pub struct RawTrade {
    pub target: String,
    pub hash: String,
    pub sender: String,
    pub amount_usd: f64,
    pub side: Side,
    pub timestamp: DateTime<Utc>,
}

impl StreamCategory for TradeStream {
    type Update = RawTrade;
    type Event = Trade;

    const NAME: &'static str = FAST_TRADE_TYPE;

    fn subscription_request(api_key: &str, blockchain: &str, targets: &[String]) -> Result<Value> {
        let request = StreamRequest::fast_trade(api_key, StreamAsset::many(blockchain, targets));
        Ok(serde_json::to_value(request)?)
    }

    fn decode(frame: &Value) -> Result<Option<RawTrade>> {
        let Some(side) = parsers::trade_side(frame) else {
            return Ok(None);
        };

        let target = parsers::trade_target(frame)
            .ok_or_else(|| invalid("trade frame has no valid token address"))?;
        let hash = parsers::non_empty_str(frame, "hash")
            .ok_or_else(|| invalid("trade frame has no hash"))?;
        let timestamp = parsers::trade_timestamp(frame)
            .ok_or_else(|| invalid("trade frame has no valid date"))?;
        let sender = parsers::non_empty_str(frame, "sender")
            .ok_or_else(|| invalid("trade frame has no sender"))?;

        Ok(Some(RawTrade {
            target: target.to_string(),
            hash: hash.to_string(),
            sender: sender.to_string(),
            amount_usd: parsers::trade_amount(frame),
            side,
            timestamp,
        }))
    }

    fn target(update: &RawTrade) -> &str {
        &update.target
    }

    fn build_event(
        update: &RawTrade,
        address: &ContractAddress,
        metadata: &TokenMetadata,
    ) -> Result<Trade> {
        // Validity requires a hash, so it always serves as the trade id.
        Trade::new(
            update.hash.clone(),
            address.clone(),
            metadata.clone(),
            update.sender.clone(),
            Money::usd(update.amount_usd)?,
            update.side,
            update.timestamp,
            update.hash.clone(),
        )
    }
}

fn invalid(reason: &str) -> MobulaError {
    MobulaError::InvalidMessage(reason.to_string())
}
