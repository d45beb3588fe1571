/*
[INPUT]:  Raw inbound frames and outbound stream messages
[OUTPUT]: Decoded JSON frames, confirmation events and sampled log lines
[POS]:    WebSocket layer - frame envelope handling shared by transport and services
[UPDATE]: When frame envelope or log sampling changes
*/

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tracing::{debug, info};

use crate::http::{MobulaError, Result};

pub(crate) const RAW_LOG_MAX_BYTES: usize = 1024;
const OUTBOUND_LOG_LIMIT: usize = 10;
const DECODE_FAIL_LOG_LIMIT: usize = 3;
const DROPPED_FRAME_LOG_LIMIT: usize = 3;

static OUTBOUND_LOG: LogSampler = LogSampler::new(OUTBOUND_LOG_LIMIT);
static DECODE_FAIL_LOG: LogSampler = LogSampler::new(DECODE_FAIL_LOG_LIMIT);
static DROPPED_FRAME_LOG: LogSampler = LogSampler::new(DROPPED_FRAME_LOG_LIMIT);

/// Counts occurrences and lets only the first `limit` through
pub(crate) struct LogSampler {
    count: AtomicUsize,
    limit: usize,
}

impl LogSampler {
    pub(crate) const fn new(limit: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            limit,
        }
    }

    /// 1-based sample index while under the limit
    pub(crate) fn next(&self) -> Option<usize> {
        let count = self.count.fetch_add(1, Ordering::Relaxed);
        (count < self.limit).then_some(count + 1)
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }
}

/// Server acknowledgement of a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfirmation {
    pub category: String,
    pub subscription_id: Option<String>,
}

pub fn parse_frame(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|err| MobulaError::InvalidMessage(err.to_string()))
}

/// `{ "event": "subscribed", "type": <category>, "subscriptionId": .. }`
pub fn subscription_confirmation(frame: &Value) -> Option<SubscriptionConfirmation> {
    if frame.get("event").and_then(Value::as_str) != Some("subscribed") {
        return None;
    }
    let category = frame.get("type").and_then(Value::as_str)?.to_string();
    let subscription_id = match frame.get("subscriptionId") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };
    Some(SubscriptionConfirmation {
        category,
        subscription_id,
    })
}

/// Lower-cased `type` field of a frame
pub fn frame_type(frame: &Value) -> Option<String> {
    frame
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
}

pub(crate) fn log_outbound(message: &Value) {
    let Some(index) = OUTBOUND_LOG.next() else {
        return;
    };

    let kind = message.get("type").and_then(Value::as_str).unwrap_or("unknown");
    let targets = message
        .get("payload")
        .and_then(|payload| payload.get("tokens").or_else(|| payload.get("items")))
        .and_then(Value::as_array)
        .map(Vec::len);

    match targets {
        Some(targets) => info!(
            sample_index = index,
            sample_limit = OUTBOUND_LOG.limit(),
            kind,
            targets,
            "ws message sent"
        ),
        None => info!(
            sample_index = index,
            sample_limit = OUTBOUND_LOG.limit(),
            kind,
            "ws message sent"
        ),
    }
}

pub(crate) fn log_decode_failure(category: &str, err: &MobulaError, raw: &str) {
    let Some(index) = DECODE_FAIL_LOG.next() else {
        return;
    };
    info!(
        sample_index = index,
        sample_limit = DECODE_FAIL_LOG.limit(),
        category,
        error = %err,
        bytes = raw.len(),
        "ws frame decode failed"
    );
    let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
    debug!(
        sample_index = index,
        sample_limit = DECODE_FAIL_LOG.limit(),
        category,
        message = %preview,
        "ws frame decode failed"
    );
}

pub(crate) fn log_dropped_frame(reason: &str, bytes: usize) {
    if let Some(index) = DROPPED_FRAME_LOG.next() {
        info!(
            sample_index = index,
            sample_limit = DROPPED_FRAME_LOG.limit(),
            reason,
            bytes,
            "ws frame dropped"
        );
    }
}

pub(crate) fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
