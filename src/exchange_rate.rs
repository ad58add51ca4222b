use chrono::{DateTime, NaiveDate, Utc};

use crate::currency_pair::CurrencyPair;

/// One observed rate for one currency pair on one date.
///
/// `rate` is stored as published: quote units per one base unit. It is not
/// validated, so zero or negative values pass through untouched.
#[derive(Debug, Clone)]
pub struct ExchangeRate {
    pub date: NaiveDate,
    pub rate: f64,
    pub currency_pair: CurrencyPair,
    pub source: String,
    pub creation_timestamp: DateTime<Utc>,
}

impl ExchangeRate {
    /// Builds a rate stamped with the current time.
    pub fn new(
        date: NaiveDate,
        rate: f64,
        currency_pair: CurrencyPair,
        source: impl Into<String>,
    ) -> Self {
        Self {
            date,
            rate,
            currency_pair,
            source: source.into(),
            creation_timestamp: Utc::now(),
        }
    }

    pub fn created_at(mut self, creation_timestamp: DateTime<Utc>) -> Self {
        self.creation_timestamp = creation_timestamp;
        self
    }
}

// Two materializations of the same observation compare equal whenever they
// were created.
impl PartialEq for ExchangeRate {
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date
            && self.rate == other.rate
            && self.currency_pair == other.currency_pair
            && self.source == other.source
    }
}
