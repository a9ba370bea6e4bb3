use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypesError {
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("Invalid truncation granularity: {0}")]
    InvalidGranularity(String),
}

/// One row of `me/getbalance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub currency_code: String,
    pub amount: Decimal,
    pub available: Decimal,
}

/// Market snapshot for a single product, shared by the REST and real-time paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub product_code: String,
    pub timestamp: String,
    pub tick_id: i64,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub best_bid_size: Decimal,
    pub best_ask_size: Decimal,
    pub total_bid_depth: Decimal,
    pub total_ask_depth: Decimal,
    /// Last traded price
    pub ltp: Decimal,
    pub volume: Decimal,
    pub volume_by_product: Decimal,
}

impl Ticker {
    /// Arithmetic mean of best bid and best ask
    pub fn mid_price(&self) -> Decimal {
        (self.best_bid + self.best_ask) / Decimal::TWO
    }

    /// Parse `timestamp` as UTC.
    ///
    /// bitFlyer sends RFC 3339 timestamps, sometimes without the zone
    /// designator (`2015-07-08T02:50:59.97`); those are read as UTC.
    pub fn date_time(&self) -> Result<DateTime<Utc>, TypesError> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return Ok(parsed.with_timezone(&Utc));
        }

        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| TypesError::InvalidTimestamp {
                value: self.timestamp.clone(),
                reason: e.to_string(),
            })
    }

    /// Truncate the parsed timestamp down to a multiple of `granularity`
    /// counted from the Unix epoch (e.g. the start of the minute or hour).
    pub fn truncate_date_time(&self, granularity: Duration) -> Result<DateTime<Utc>, TypesError> {
        self.date_time()?
            .duration_trunc(granularity)
            .map_err(|e| TypesError::InvalidGranularity(e.to_string()))
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} bid={} ask={} ltp={} vol={} @ {}",
            self.product_code,
            self.tick_id,
            self.best_bid,
            self.best_ask,
            self.ltp,
            self.volume,
            self.timestamp
        )
    }
}
