use std::sync::Arc;

use crate::currency_pair::CurrencyPair;
use crate::destination::ExchangeRateDestination;
use crate::error::IngestError;
use crate::source::{EURO, EcbSource, ExchangeRateSource};
use crate::transport::Transport;

/// Fetches rates for `currency_pairs` from `source` and loads them into
/// `destination`. Nothing is loaded when the fetch fails.
pub async fn run(
    destination: &dyn ExchangeRateDestination,
    currency_pairs: &[CurrencyPair],
    source: &dyn ExchangeRateSource,
) -> Result<(), IngestError> {
    let rates = source.get_exchange_rates(currency_pairs).await?;
    log::info!(
        "Fetched {} rates for {} currency pairs",
        rates.len(),
        currency_pairs.len()
    );

    destination.load_exchange_rates(&rates).await?;

    Ok(())
}

/// Pairs every currency against the euro and ingests the last
/// `lookback_days` days of ECB reference rates for them.
pub async fn ingest_euro_rates(
    destination: &dyn ExchangeRateDestination,
    transport: Arc<dyn Transport>,
    ecb_api_url: &str,
    currencies: &[String],
    lookback_days: u32,
) -> Result<(), IngestError> {
    let currency_pairs = currencies
        .iter()
        .map(|currency| CurrencyPair::new(EURO, currency))
        .collect::<Result<Vec<_>, _>>()?;
    log::info!("Currencies: {:?}, lookback {} days", currencies, lookback_days);

    let source = EcbSource::new(transport, lookback_days).with_base_url(ecb_api_url);
    run(destination, &currency_pairs, &source).await
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::destination::MemoryDestination;
    use crate::error::{PairError, PersistenceError, SourceError};
    use crate::exchange_rate::ExchangeRate;
    use crate::fixture::FixtureTransport;
    use crate::source::{DEFAULT_ECB_API_URL, ECB_SOURCE};

    /// Serves five daily rates per requested pair.
    struct FakeSource;

    #[async_trait]
    impl ExchangeRateSource for FakeSource {
        async fn get_exchange_rates(
            &self,
            currency_pairs: &[CurrencyPair],
        ) -> Result<Vec<ExchangeRate>, SourceError> {
            Ok(currency_pairs
                .iter()
                .flat_map(|pair| {
                    (1..=5).map(move |day| {
                        ExchangeRate::new(
                            NaiveDate::from_ymd_opt(2023, 10, day).unwrap(),
                            expected_rate(pair, day),
                            pair.clone(),
                            ECB_SOURCE,
                        )
                    })
                })
                .collect())
        }
    }

    fn expected_rate(pair: &CurrencyPair, day: u32) -> f64 {
        let base = if pair.quote() == "GBP" { 0.86 } else { 1.05 };
        base + f64::from(day) / 1000.0
    }

    struct FailingDestination;

    #[async_trait]
    impl ExchangeRateDestination for FailingDestination {
        async fn load_exchange_rates(&self, _: &[ExchangeRate]) -> Result<(), PersistenceError> {
            Err(PersistenceError::Io(std::io::Error::other("disk full")))
        }
    }

    fn pairs() -> Vec<CurrencyPair> {
        vec![
            CurrencyPair::new("EUR", "GBP").unwrap(),
            CurrencyPair::new("EUR", "USD").unwrap(),
        ]
    }

    #[tokio::test]
    async fn persists_every_fetched_rate() {
        let destination = MemoryDestination::new();

        run(&destination, &pairs(), &FakeSource).await.unwrap();

        let stored = destination.rates();
        assert_eq!(stored.len(), 10);
        for pair in pairs() {
            for day in 1..=5 {
                let expected = ExchangeRate::new(
                    NaiveDate::from_ymd_opt(2023, 10, day).unwrap(),
                    expected_rate(&pair, day),
                    pair.clone(),
                    ECB_SOURCE,
                );
                assert!(stored.contains(&expected), "{pair} on day {day}");
            }
        }
    }

    #[tokio::test]
    async fn failed_fetch_never_persists() {
        let destination = MemoryDestination::new();
        let source = EcbSource::new(Arc::new(FixtureTransport::new()), 10);

        let err = run(&destination, &pairs(), &source).await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::Source(SourceError::UpstreamRequest { .. })
        ));
        assert_eq!(destination.loads(), 0);
    }

    #[tokio::test]
    async fn persistence_error_propagates() {
        let err = run(&FailingDestination, &pairs(), &FakeSource)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Persistence(PersistenceError::Io(_))));
    }

    #[tokio::test]
    async fn euro_itself_is_rejected_before_fetching() {
        let destination = MemoryDestination::new();
        let transport = Arc::new(FixtureTransport::new());

        let err = ingest_euro_rates(
            &destination,
            transport.clone(),
            DEFAULT_ECB_API_URL,
            &["GBP".to_string(), "eur".to_string()],
            10,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, IngestError::Pair(PairError::InvalidPair(_))));
        assert_eq!(transport.calls(), 0);
        assert_eq!(destination.loads(), 0);
    }

    #[tokio::test]
    async fn ingests_euro_rates_from_feed() {
        let destination = MemoryDestination::new();
        let transport = Arc::new(
            FixtureTransport::new()
                .with_response("GBP", include_str!("../tests/data/ecb_gbp.xml"))
                .with_response("USD", include_str!("../tests/data/ecb_usd.xml")),
        );

        ingest_euro_rates(
            &destination,
            transport.clone(),
            DEFAULT_ECB_API_URL,
            &["gbp".to_string(), "usd".to_string()],
            5,
        )
        .await
        .unwrap();

        assert_eq!(destination.rates().len(), 10);
        assert_eq!(transport.calls(), 2);
    }
}
