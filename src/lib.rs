//! Ingests the ECB's daily euro reference rates into a warehouse table.
//!
//! [`source::EcbSource`] fetches one SDMX-ML response per currency pair and
//! [`sdmx`] turns it into [`ExchangeRate`]s, which a
//! [`destination::ExchangeRateDestination`] then stores.
//! [`service::run`] wires the two together.

pub mod config;
pub mod currency_pair;
pub mod destination;
pub mod error;
pub mod exchange_rate;
pub mod fixture;
pub mod sdmx;
pub mod server;
pub mod service;
pub mod source;
pub mod transport;

pub use currency_pair::CurrencyPair;
pub use exchange_rate::ExchangeRate;
