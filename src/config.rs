use std::str::FromStr;

use crate::destination::{DEFAULT_TABLE, WriteDisposition};
use crate::error::ConfigError;
use crate::source::{DEFAULT_ECB_API_URL, DEFAULT_LOOKBACK_DAYS};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: Option<String>,
    pub ecb_api_url: String,
    pub exchange_rates_table: String,
    pub write_disposition: WriteDisposition,
    pub lookback_days: u32,
    pub bind_address: String,
    pub default_currencies: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; blank values count as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            database_url: var("DATABASE_URL"),
            ecb_api_url: var("ECB_API_URL").unwrap_or_else(|| DEFAULT_ECB_API_URL.to_string()),
            exchange_rates_table: var("EXCHANGE_RATES_TABLE")
                .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            write_disposition: parse(var("WRITE_DISPOSITION"), "WRITE_DISPOSITION")?
                .unwrap_or_default(),
            lookback_days: parse(var("LOOKBACK_DAYS"), "LOOKBACK_DAYS")?
                .unwrap_or(DEFAULT_LOOKBACK_DAYS),
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            default_currencies: split_currencies(
                &var("DEFAULT_CURRENCIES").unwrap_or_else(|| "GBP,USD".to_string()),
            ),
        })
    }
}

/// Splits a comma separated currency list, dropping blanks.
pub fn split_currencies(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|currency| !currency.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse<T>(value: Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|err: T::Err| ConfigError::InvalidValue {
                    key,
                    reason: err.to_string(),
                    value,
                })
        })
        .transpose()
}
