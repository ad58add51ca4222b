use reqwest::StatusCode;
use thiserror::Error;

use crate::currency_pair::CurrencyPair;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairError {
    #[error("Invalid currency pair: base and quote are both {0}")]
    InvalidPair(String),

    #[error("Malformed currency pair {0:?}, expected BASE/QUOTE")]
    Malformed(String),
}

/// Failures while turning an SDMX-ML payload into observations.
#[derive(Debug, Error)]
pub enum SdmxError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Document ended before every element was closed")]
    Truncated,

    #[error("Invalid observation date {value:?}: {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid observation value {value:?}: {source}")]
    InvalidRate {
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unsupported base currency for {pair}: this source only quotes against {anchor}")]
    UnsupportedBaseCurrency {
        pair: CurrencyPair,
        anchor: &'static str,
    },

    #[error("Upstream request for {pair} returned status {status}")]
    UpstreamRequest {
        pair: CurrencyPair,
        status: StatusCode,
    },

    #[error("Upstream request for {pair} failed: {source}")]
    Transport {
        pair: CurrencyPair,
        #[source]
        source: BoxError,
    },

    #[error("Can't parse response for {pair}: {source}")]
    Parse {
        pair: CurrencyPair,
        #[source]
        source: SdmxError,
    },

    #[error("Can't compute a {days} day window ending {end}")]
    DateOutOfRange { end: chrono::NaiveDate, days: u32 },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid table name {0:?}")]
    InvalidTable(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Pair(#[from] PairError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}
