/*
[INPUT]:  Decoded stream frames with inconsistent field naming
[OUTPUT]: Typed field values picked from ordered candidate lists
[POS]:    WebSocket layer - tolerant field extraction
[UPDATE]: When the provider renames or adds frame fields
*/

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::types::Side;

pub const PRICE_USD_FIELDS: &[&str] = &["priceUSD", "price_usd", "priceUsd", "price", "priceToken"];
pub const PRICE_SOL_FIELDS: &[&str] = &["priceToken", "price_token", "priceSOL", "price_sol"];
pub const VARIATION_24H_FIELDS: &[&str] = &["priceChange24hPercentage", "price_change_24h"];
pub const TRADE_AMOUNT_FIELDS: &[&str] = &[
    "tokenAmountUsd",
    "token_amount_usd",
    "amountUsd",
    "amount_usd",
    "tokenAmountVs",
    "amount",
    "tokenAmount",
    "token_amount",
];

/// `date` values at or above this are epoch milliseconds
const MILLIS_THRESHOLD: f64 = 1e11;

/// First candidate field holding a finite number accepted by `accept`
pub fn first_number(object: &Value, fields: &[&str], accept: impl Fn(f64) -> bool) -> Option<f64> {
    fields
        .iter()
        .filter_map(|field| object.get(*field).and_then(Value::as_f64))
        .find(|value| value.is_finite() && accept(*value))
}

pub fn non_empty_str<'a>(object: &'a Value, field: &str) -> Option<&'a str> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
}

/// Side of a `buy`/`sell` frame, matched case-insensitively
pub fn trade_side(frame: &Value) -> Option<Side> {
    frame.get("type").and_then(Value::as_str).and_then(Side::parse)
}

fn token_data(frame: &Value) -> Option<&Value> {
    frame.get("tokenData").filter(|data| data.is_object())
}

pub fn price_usd(token_data: &Value) -> Option<f64> {
    first_number(token_data, PRICE_USD_FIELDS, |value| value > 0.0)
}

pub fn price_sol(token_data: &Value) -> Option<f64> {
    first_number(token_data, PRICE_SOL_FIELDS, |value| value >= 0.0)
}

pub fn variation_24h(token_data: &Value) -> f64 {
    first_number(token_data, VARIATION_24H_FIELDS, |_| true).unwrap_or(0.0)
}

pub fn trade_amount(frame: &Value) -> f64 {
    first_number(frame, TRADE_AMOUNT_FIELDS, |value| value > 0.0).unwrap_or(0.0)
}

/// `token`, then `tokenData.address`
pub fn trade_target(frame: &Value) -> Option<&str> {
    non_empty_str(frame, "token")
        .or_else(|| token_data(frame).and_then(|data| non_empty_str(data, "address")))
}

/// `tokenData.address`, then `token`
pub fn price_target(frame: &Value) -> Option<&str> {
    token_data(frame)
        .and_then(|data| non_empty_str(data, "address"))
        .or_else(|| non_empty_str(frame, "token"))
}

pub fn price_fields(frame: &Value) -> Option<&Value> {
    token_data(frame)
}

/// Epoch seconds, or milliseconds for values past the threshold
pub fn trade_timestamp(frame: &Value) -> Option<DateTime<Utc>> {
    let date = frame.get("date").and_then(Value::as_f64)?;
    if !date.is_finite() || date <= 0.0 {
        return None;
    }
    let millis = if date >= MILLIS_THRESHOLD { date } else { date * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64)
}
