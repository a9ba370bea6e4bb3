use crate::core::types::Ticker;
use serde_json::Value;
use thiserror::Error;

/// Why a push payload did not yield a ticker. Never surfaced to consumers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedFrame {
    #[error("payload is not a JSON array")]
    NotAnArray,
    #[error("first element is not a message batch")]
    MissingBatch,
    #[error("message batch is empty")]
    EmptyBatch,
    #[error("message is not a ticker: {0}")]
    InvalidTicker(String),
}

/// Pull the first ticker out of a batch envelope `[[{ticker}, ...], meta...]`.
///
/// The envelope is walked as an untyped JSON tree first; only the first
/// message of the batch is then decoded into `Ticker`.
pub fn decode_ticker_frame(payload: &str) -> Result<Ticker, MalformedFrame> {
    let envelope: Vec<Value> =
        serde_json::from_str(payload).map_err(|_| MalformedFrame::NotAnArray)?;

    let batch = match envelope.into_iter().next() {
        Some(Value::Array(batch)) => batch,
        _ => return Err(MalformedFrame::MissingBatch),
    };

    let message = batch.into_iter().next().ok_or(MalformedFrame::EmptyBatch)?;

    serde_json::from_value(message).map_err(|e| MalformedFrame::InvalidTicker(e.to_string()))
}
