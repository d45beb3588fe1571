/*
[INPUT]:  Validated values decoded from REST snapshots and stream frames
[OUTPUT]: Domain entities (addresses, money, price updates, trades, metadata)
[POS]:    Data layer - domain model shared by services and stores
[UPDATE]: When domain invariants or entity fields change
*/

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};

use super::enums::{Currency, Side};
use crate::http::{MobulaError, Result};

/// Wrapped SOL mint, used as the identifier of the chain's native asset
pub const NATIVE_SOL_ADDRESS: &str = "So11111111111111111111111111111111111111112";

/// Shortest accepted contract address
pub const MIN_CONTRACT_ADDRESS_LEN: usize = 32;

/// Token or contract address.
///
/// The original casing is kept for outbound messages; equality and hashing
/// are ASCII case-insensitive.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractAddress(String);

impl ContractAddress {
    pub fn new(address: &str) -> Result<Self> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(MobulaError::InvalidAddress(
                "contract address cannot be empty".to_string(),
            ));
        }
        if trimmed.len() < MIN_CONTRACT_ADDRESS_LEN {
            return Err(MobulaError::InvalidAddress(format!(
                "{trimmed} is shorter than {MIN_CONTRACT_ADDRESS_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn native_sol() -> Self {
        Self(NATIVE_SOL_ADDRESS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used as a cache key
    pub fn key(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }

    pub fn is_native(&self) -> bool {
        self.matches(NATIVE_SOL_ADDRESS)
    }
}

impl PartialEq for ContractAddress {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for ContractAddress {}

impl Hash for ContractAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_usize(self.0.len());
    }
}

impl fmt::Debug for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractAddress({})", self.0)
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContractAddress {
    type Error = MobulaError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<ContractAddress> for String {
    fn from(value: ContractAddress) -> Self {
        value.0
    }
}

/// Non-negative monetary amount in a fixed currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MobulaError::InvalidValue(format!(
                "{currency} amount must be non-negative, got {amount}"
            )));
        }
        Ok(Self { amount, currency })
    }

    pub fn from_f64(amount: f64, currency: Currency) -> Result<Self> {
        Self::new(decimal_from_f64(amount)?, currency)
    }

    pub fn usd(amount: f64) -> Result<Self> {
        Self::from_f64(amount, Currency::Usd)
    }

    pub fn sol(amount: f64) -> Result<Self> {
        Self::from_f64(amount, Currency::Sol)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency)
    }
}

/// Signed percentage (e.g. 24h variation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Percentage {
    pub fn from_f64(value: f64) -> Result<Self> {
        decimal_from_f64(value).map(Self)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0.is_sign_negative() && !self.0.is_zero() { "" } else { "+" };
        write!(f, "{sign}{:.2}%", self.0)
    }
}

fn decimal_from_f64(value: f64) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(MobulaError::InvalidValue(format!(
            "expected a finite number, got {value}"
        )));
    }
    Decimal::from_f64(value)
        .ok_or_else(|| MobulaError::InvalidValue(format!("{value} is out of decimal range")))
}

/// Descriptive token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

impl TokenMetadata {
    pub fn native_sol() -> Self {
        Self {
            symbol: "SOL".to_string(),
            name: "Solana".to_string(),
            decimals: 9,
            logo: None,
        }
    }

    pub fn unknown() -> Self {
        Self {
            symbol: "UNKNOWN".to_string(),
            name: "Unknown Token".to_string(),
            decimals: 0,
            logo: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.symbol == "UNKNOWN"
    }
}

/// Latest observed price of one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub contract_address: ContractAddress,
    pub metadata: TokenMetadata,
    pub price_usd: Money,
    pub price_sol: Money,
    pub variation_24h: Percentage,
    pub last_update: DateTime<Utc>,
}

impl PriceUpdate {
    /// Build a price update. The native asset is always priced at exactly 1 SOL.
    pub fn new(
        contract_address: ContractAddress,
        metadata: TokenMetadata,
        price_usd: f64,
        price_sol: f64,
        variation_24h: f64,
        last_update: DateTime<Utc>,
    ) -> Result<Self> {
        let price_sol = if contract_address.is_native() {
            Money::new(Decimal::ONE, Currency::Sol)?
        } else {
            Money::sol(price_sol)?
        };

        Ok(Self {
            contract_address,
            metadata,
            price_usd: Money::usd(price_usd)?,
            price_sol,
            variation_24h: Percentage::from_f64(variation_24h)?,
            last_update,
        })
    }
}

/// Single executed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub contract_address: ContractAddress,
    pub metadata: TokenMetadata,
    pub wallet_address: String,
    pub amount: Money,
    pub side: Side,
    pub timestamp: DateTime<Utc>,
    pub transaction_hash: String,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        contract_address: ContractAddress,
        metadata: TokenMetadata,
        wallet_address: impl Into<String>,
        amount: Money,
        side: Side,
        timestamp: DateTime<Utc>,
        transaction_hash: impl Into<String>,
    ) -> Result<Self> {
        let id = require_non_blank(id.into(), "trade id")?;
        let wallet_address = require_non_blank(wallet_address.into(), "wallet address")?;
        let transaction_hash = require_non_blank(transaction_hash.into(), "transaction hash")?;

        Ok(Self {
            id,
            contract_address,
            metadata,
            wallet_address,
            amount,
            side,
            timestamp,
            transaction_hash,
        })
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.side == Side::Sell
    }
}

fn require_non_blank(value: String, field: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(MobulaError::InvalidValue(format!("{field} cannot be empty")));
    }
    Ok(value)
}
