use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use reqwest::StatusCode;

use crate::currency_pair::CurrencyPair;
use crate::error::SourceError;
use crate::exchange_rate::ExchangeRate;
use crate::sdmx;
use crate::transport::Transport;

/// Base currency every ECB reference rate is quoted against.
pub const EURO: &str = "EUR";

/// Provenance tag of rates read from the ECB feed.
pub const ECB_SOURCE: &str = "ECB API";

pub const DEFAULT_ECB_API_URL: &str = "https://data-api.ecb.europa.eu/service/data/EXR";

pub const DEFAULT_LOOKBACK_DAYS: u32 = 10;

#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    /// Fetches rates for every pair, in request order.
    ///
    /// Either all pairs succeed or nothing is returned.
    async fn get_exchange_rates(
        &self,
        currency_pairs: &[CurrencyPair],
    ) -> Result<Vec<ExchangeRate>, SourceError>;
}

/// Daily reference rates from the ECB statistical data API.
pub struct EcbSource {
    transport: Arc<dyn Transport>,
    base_url: String,
    lookback_days: u32,
}

impl EcbSource {
    pub fn new(transport: Arc<dyn Transport>, lookback_days: u32) -> Self {
        Self {
            transport,
            base_url: DEFAULT_ECB_API_URL.to_string(),
            lookback_days,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_pair(
        &self,
        pair: &CurrencyPair,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExchangeRate>, SourceError> {
        let url = request_url(&self.base_url, pair, start, end);
        log::info!("Requesting {} rates from {}", pair, url);

        let response = self
            .transport
            .get(&url)
            .await
            .map_err(|source| SourceError::Transport {
                pair: pair.clone(),
                source,
            })?;
        if response.status != StatusCode::OK {
            return Err(SourceError::UpstreamRequest {
                pair: pair.clone(),
                status: response.status,
            });
        }

        let rates = sdmx::parse_exchange_rates(&response.body, pair, ECB_SOURCE).map_err(
            |source| SourceError::Parse {
                pair: pair.clone(),
                source,
            },
        )?;
        log::info!("Parsed {} {} rates", rates.len(), pair);

        Ok(rates)
    }
}

#[async_trait]
impl ExchangeRateSource for EcbSource {
    async fn get_exchange_rates(
        &self,
        currency_pairs: &[CurrencyPair],
    ) -> Result<Vec<ExchangeRate>, SourceError> {
        if let Some(pair) = currency_pairs.iter().find(|pair| pair.base() != EURO) {
            return Err(SourceError::UnsupportedBaseCurrency {
                pair: pair.clone(),
                anchor: EURO,
            });
        }

        let (start, end) = lookback_window(Utc::now().date_naive(), self.lookback_days)?;

        let mut rates = Vec::new();
        for pair in currency_pairs {
            rates.extend(self.fetch_pair(pair, start, end).await?);
        }

        Ok(rates)
    }
}

/// The inclusive `[today - days, today]` window.
pub fn lookback_window(today: NaiveDate, days: u32) -> Result<(NaiveDate, NaiveDate), SourceError> {
    let start = today
        .checked_sub_days(Days::new(days.into()))
        .ok_or(SourceError::DateOutOfRange { end: today, days })?;

    Ok((start, today))
}

pub fn request_url(base_url: &str, pair: &CurrencyPair, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{}/D.{}.{}.SP00.A/?startPeriod={}&endPeriod={}",
        base_url.trim_end_matches('/'),
        pair.quote(),
        pair.base(),
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}
