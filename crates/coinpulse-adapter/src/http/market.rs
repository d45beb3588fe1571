/*
[INPUT]:  Contract addresses and token metadata
[OUTPUT]: Market data, trade history, metadata and domain snapshots
[POS]:    HTTP layer - public market data endpoints
[UPDATE]: When adding new endpoints or changing snapshot conversion
*/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use tracing::{debug, warn};

use crate::http::{MobulaClient, MobulaError, Result};
use crate::metadata::MetadataSource;
use crate::types::{
    ApiEnvelope, ContractAddress, MarketData, Money, PriceUpdate, Side, TokenMetadata,
    TokenMetadataResponse, Trade, TradeHistoryItem, NATIVE_SOL_ADDRESS,
};

const MARKET_DATA_ENDPOINT: &str = "/market/data";
const PAIR_TRADES_ENDPOINT: &str = "/market/trades/pair";
const TOKEN_METADATA_ENDPOINT: &str = "/metadata";

/// SOL/USD quote used when the live quote cannot be fetched
pub const FALLBACK_SOL_PRICE_USD: f64 = 150.0;

/// Initial REST snapshots that seed the client-side stores
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn price_snapshot(
        &self,
        address: &ContractAddress,
        metadata: &TokenMetadata,
    ) -> Result<PriceUpdate>;

    /// Newest-first trade history
    async fn trade_snapshot(
        &self,
        address: &ContractAddress,
        metadata: &TokenMetadata,
        limit: usize,
    ) -> Result<Vec<Trade>>;
}

impl MobulaClient {
    /// Query market data for a token
    ///
    /// GET /market/data?asset={address}&blockchain={chain}
    pub async fn get_market_data(&self, address: &str) -> Result<MarketData> {
        let builder = self
            .request(Method::GET, MARKET_DATA_ENDPOINT)?
            .query(&[("asset", address), ("blockchain", self.blockchain())]);
        let envelope: ApiEnvelope<MarketData> = self.send_json(builder).await?;
        Ok(envelope.data)
    }

    /// Query the most recent trades of a token, newest first
    ///
    /// GET /market/trades/pair?mode=asset&asset={address}&blockchain={chain}&sortOrder=desc&limit={limit}
    pub async fn get_trade_history(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TradeHistoryItem>> {
        let limit = limit.to_string();
        let builder = self.request(Method::GET, PAIR_TRADES_ENDPOINT)?.query(&[
            ("mode", "asset"),
            ("asset", address),
            ("blockchain", self.blockchain()),
            ("sortOrder", "desc"),
            ("limit", limit.as_str()),
        ]);
        let envelope: ApiEnvelope<Vec<TradeHistoryItem>> = self.send_json(builder).await?;
        Ok(envelope.data)
    }

    /// Query token metadata
    ///
    /// GET /metadata?asset={address}&blockchain={chain}
    pub async fn get_token_metadata(&self, address: &str) -> Result<TokenMetadataResponse> {
        let builder = self
            .request(Method::GET, TOKEN_METADATA_ENDPOINT)?
            .query(&[("asset", address), ("blockchain", self.blockchain())]);
        let envelope: ApiEnvelope<TokenMetadataResponse> = self.send_json(builder).await?;
        Ok(envelope.data)
    }

    /// SOL/USD quote, fetched once per client
    pub async fn sol_price_usd(&self) -> f64 {
        *self
            .sol_price_usd
            .get_or_init(|| async {
                match self.get_market_data(NATIVE_SOL_ADDRESS).await {
                    Ok(MarketData {
                        price: Some(price), ..
                    }) if price.is_finite() && price > 0.0 => price,
                    Ok(_) => {
                        warn!("SOL quote missing from market data; using fallback");
                        FALLBACK_SOL_PRICE_USD
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to fetch SOL quote; using fallback");
                        FALLBACK_SOL_PRICE_USD
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl SnapshotSource for MobulaClient {
    async fn price_snapshot(
        &self,
        address: &ContractAddress,
        metadata: &TokenMetadata,
    ) -> Result<PriceUpdate> {
        let market = self.get_market_data(address.as_str()).await?;
        let price_usd = market.price.unwrap_or(0.0);

        let price_sol = if address.is_native() {
            1.0
        } else {
            let sol_usd = self.sol_price_usd().await;
            if sol_usd > 0.0 { price_usd / sol_usd } else { 0.0 }
        };

        let metadata = match (&market.symbol, &market.name) {
            (Some(symbol), Some(name)) if metadata.is_unknown() => TokenMetadata {
                symbol: symbol.clone(),
                name: name.clone(),
                decimals: metadata.decimals,
                logo: None,
            },
            _ => metadata.clone(),
        };

        PriceUpdate::new(
            address.clone(),
            metadata,
            price_usd,
            price_sol,
            market.variation_24h(),
            Utc::now(),
        )
    }

    async fn trade_snapshot(
        &self,
        address: &ContractAddress,
        metadata: &TokenMetadata,
        limit: usize,
    ) -> Result<Vec<Trade>> {
        let items = self.get_trade_history(address.as_str(), limit).await?;
        let total = items.len();

        let trades: Vec<Trade> = items
            .into_iter()
            .filter_map(|item| match trade_from_history(address, metadata, item) {
                Ok(trade) => trade,
                Err(err) => {
                    debug!(%address, error = %err, "skipping malformed history trade");
                    None
                }
            })
            .collect();

        debug!(%address, total, kept = trades.len(), "trade history snapshot");
        Ok(trades)
    }
}

/// `Ok(None)` for entries without a valid side, hash or timestamp
fn trade_from_history(
    address: &ContractAddress,
    metadata: &TokenMetadata,
    item: TradeHistoryItem,
) -> Result<Option<Trade>> {
    let Some(side) = item.kind.as_deref().and_then(Side::parse) else {
        return Ok(None);
    };
    let Some(hash) = item.hash.filter(|hash| !hash.is_empty()) else {
        return Ok(None);
    };
    let Some(timestamp) = item
        .timestamp
        .filter(|ts| ts.is_finite() && *ts > 0.0)
        .and_then(|ts| DateTime::from_timestamp_millis((ts * 1000.0) as i64))
    else {
        return Ok(None);
    };

    let amount = item
        .amount_usd
        .or(item.amount)
        .filter(|amount| amount.is_finite() && *amount >= 0.0)
        .unwrap_or(0.0);

    let trade = Trade::new(
        hash.clone(),
        address.clone(),
        metadata.clone(),
        item.from.unwrap_or_default(),
        Money::usd(amount)?,
        side,
        timestamp,
        hash,
    )?;
    Ok(Some(trade))
}

#[async_trait]
impl MetadataSource for MobulaClient {
    async fn fetch_metadata(&self, address: &str) -> Result<TokenMetadata> {
        let response = self.get_token_metadata(address).await?;
        if response.symbol.trim().is_empty() {
            return Err(MobulaError::InvalidResponse(format!(
                "metadata for {address} has no symbol"
            )));
        }
        Ok(TokenMetadata {
            symbol: response.symbol,
            name: response.name,
            decimals: response.decimals,
            logo: response.logo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiKey;
    use crate::http::ClientConfig;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    fn client_for(server: &MockServer) -> MobulaClient {
        MobulaClient::with_config(
            ClientConfig::default().with_base_url(server.uri()),
            ApiKey::new("test-key").expect("api key"),
        )
        .expect("client init")
    }

    fn bonk_metadata() -> TokenMetadata {
        TokenMetadata {
            symbol: "BONK".to_string(),
            name: "Bonk".to_string(),
            decimals: 5,
            logo: None,
        }
    }

    #[tokio::test]
    async fn test_get_market_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/market/data"))
            .and(query_param("asset", BONK))
            .and(query_param("blockchain", "solana"))
            .and(header("authorization", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "price": 0.5,
                    "symbol": "BONK",
                    "name": "Bonk",
                    "price_change_24h": 2.5
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let market = client_for(&server)
            .get_market_data(BONK)
            .await
            .expect("get_market_data failed");

        assert_eq!(market.price, Some(0.5));
        assert_eq!(market.symbol.as_deref(), Some("BONK"));
        assert_eq!(market.variation_24h(), 2.5);
    }

    #[tokio::test]
    async fn test_price_snapshot_converts_to_sol() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/market/data"))
            .and(query_param("asset", BONK))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "price": 50.0, "price_24h_ago": 40.0 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/market/data"))
            .and(query_param("asset", NATIVE_SOL_ADDRESS))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "price": 200.0 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let address = ContractAddress::new(BONK).unwrap();
        let snapshot = client
            .price_snapshot(&address, &bonk_metadata())
            .await
            .expect("price snapshot");

        assert_eq!(snapshot.price_usd.amount(), Decimal::from(50));
        assert_eq!(snapshot.price_sol.amount(), Decimal::from_str("0.25").unwrap());
        assert_eq!(snapshot.variation_24h.value(), Decimal::from(25));

        // SOL quote is cached for the client's lifetime
        client
            .price_snapshot(&address, &bonk_metadata())
            .await
            .expect("second snapshot");
    }

    #[tokio::test]
    async fn test_trade_snapshot_filters_invalid_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/market/trades/pair"))
            .and(query_param("mode", "asset"))
            .and(query_param("asset", BONK))
            .and(query_param("sortOrder", "desc"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "hash": "0xaaa", "from": "wallet-1", "amount_usd": 12.5, "amount": 99.0, "type": "buy", "timestamp": 1700000000 },
                    { "hash": "0xbbb", "from": "wallet-2", "amount": 3.0, "type": "SELL", "timestamp": 1699999990 },
                    { "hash": "0xccc", "from": "wallet-3", "type": "swap", "timestamp": 1699999980 },
                    { "hash": "", "from": "wallet-4", "type": "buy", "timestamp": 1699999970 },
                    { "hash": "0xddd", "from": "wallet-5", "type": "buy" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let address = ContractAddress::new(BONK).unwrap();
        let trades = client_for(&server)
            .trade_snapshot(&address, &bonk_metadata(), 20)
            .await
            .expect("trade snapshot");

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].id, "0xaaa");
        assert_eq!(trades[0].amount.amount(), Decimal::from_str("12.5").unwrap());
        assert_eq!(trades[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(trades[1].side, Side::Sell);
        assert_eq!(trades[1].amount.amount(), Decimal::from(3));
    }

    #[tokio::test]
    async fn test_auth_failure_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_metadata(BONK)
            .await
            .expect_err("401 should fail");
        assert!(err.is_auth_error());
    }
}
