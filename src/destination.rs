use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::SubsecRound;
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::io::AsyncWriteExt;

use crate::error::PersistenceError;
use crate::exchange_rate::ExchangeRate;

pub const DEFAULT_TABLE: &str = "raw.exchange_rates";

// Six binds per row keeps a chunk well under the Postgres bind limit.
const INSERT_CHUNK: usize = 1000;

#[async_trait]
pub trait ExchangeRateDestination: Send + Sync {
    async fn load_exchange_rates(&self, rates: &[ExchangeRate]) -> Result<(), PersistenceError>;
}

/// Persisted field layout of one rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeRateRecord {
    pub date: String,
    pub exchange_rate: f64,
    pub base_currency: String,
    pub quote_currency: String,
    pub source: String,
    pub creation_date: String,
}

impl From<&ExchangeRate> for ExchangeRateRecord {
    fn from(rate: &ExchangeRate) -> Self {
        Self {
            date: rate.date.format("%Y-%m-%d").to_string(),
            exchange_rate: rate.rate,
            base_currency: rate.currency_pair.base().to_string(),
            quote_currency: rate.currency_pair.quote().to_string(),
            source: rate.source.clone(),
            creation_date: rate.creation_timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// How a load treats rows already stored for the same date and pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteDisposition {
    /// Insert only. Overlapping runs store duplicate rows.
    #[default]
    Append,
    /// Delete stored rows for each loaded (date, base, quote), then insert,
    /// in one transaction.
    Replace,
}

impl FromStr for WriteDisposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "replace" => Ok(Self::Replace),
            other => Err(format!("expected append or replace, got {other:?}")),
        }
    }
}

pub struct PgDestination {
    pool: PgPool,
    table: String,
    disposition: WriteDisposition,
}

impl PgDestination {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self, PersistenceError> {
        let table = table.into();
        validate_table(&table)?;

        Ok(Self {
            pool,
            table,
            disposition: WriteDisposition::default(),
        })
    }

    pub fn with_disposition(mut self, disposition: WriteDisposition) -> Self {
        self.disposition = disposition;
        self
    }

    /// Creates the schema, table and lookup index if they don't exist yet.
    pub async fn ensure_table(&self) -> Result<(), PersistenceError> {
        let (schema, name) = match self.table.split_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, self.table.as_str()),
        };

        if let Some(schema) = schema {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
                .execute(&self.pool)
                .await?;
        }
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {} (
                date DATE NOT NULL,
                exchange_rate DOUBLE PRECISION NOT NULL,
                base_currency TEXT NOT NULL,
                quote_currency TEXT NOT NULL,
                source TEXT NOT NULL,
                creation_date TIMESTAMP NOT NULL
            )"#,
            self.table
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {name}_pair_date_idx ON {} (date, base_currency, quote_currency)",
            self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ExchangeRateDestination for PgDestination {
    async fn load_exchange_rates(&self, rates: &[ExchangeRate]) -> Result<(), PersistenceError> {
        if rates.is_empty() {
            log::info!("No rates to load into {}", self.table);
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        if self.disposition == WriteDisposition::Replace {
            let keys: BTreeSet<_> = rates
                .iter()
                .map(|rate| {
                    (
                        rate.date,
                        rate.currency_pair.base(),
                        rate.currency_pair.quote(),
                    )
                })
                .collect();
            let delete = format!(
                "DELETE FROM {} WHERE date = $1 AND base_currency = $2 AND quote_currency = $3",
                self.table
            );
            for (date, base, quote) in keys {
                sqlx::query(&delete)
                    .bind(date)
                    .bind(base)
                    .bind(quote)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        for chunk in rates.chunks(INSERT_CHUNK) {
            let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (date, exchange_rate, base_currency, quote_currency, source, creation_date) ",
                self.table
            ));
            query.push_values(chunk, |mut row, rate| {
                row.push_bind(rate.date)
                    .push_bind(rate.rate)
                    .push_bind(rate.currency_pair.base().to_string())
                    .push_bind(rate.currency_pair.quote().to_string())
                    .push_bind(rate.source.clone())
                    .push_bind(rate.creation_timestamp.naive_utc().trunc_subsecs(0));
            });
            query.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        log::info!(
            "Loaded {} rates into {} ({:?})",
            rates.len(),
            self.table,
            self.disposition
        );

        Ok(())
    }
}

/// Appends one JSON object per rate to a file.
pub struct JsonLinesDestination {
    path: PathBuf,
}

impl JsonLinesDestination {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ExchangeRateDestination for JsonLinesDestination {
    async fn load_exchange_rates(&self, rates: &[ExchangeRate]) -> Result<(), PersistenceError> {
        let mut buf = Vec::new();
        for rate in rates {
            serde_json::to_writer(&mut buf, &ExchangeRateRecord::from(rate))?;
            buf.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        log::info!("Wrote {} rates to {}", rates.len(), self.path.display());

        Ok(())
    }
}

/// Keeps loaded rates in memory.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    rates: Mutex<Vec<ExchangeRate>>,
    loads: AtomicUsize,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rates(&self) -> Vec<ExchangeRate> {
        self.rates
            .lock()
            .map(|rates| rates.clone())
            .unwrap_or_default()
    }

    /// Number of `load_exchange_rates` calls so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeRateDestination for MemoryDestination {
    async fn load_exchange_rates(&self, rates: &[ExchangeRate]) -> Result<(), PersistenceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let mut stored = self
            .rates
            .lock()
            .map_err(|_| PersistenceError::Io(std::io::Error::other("rate store poisoned")))?;
        stored.extend_from_slice(rates);

        Ok(())
    }
}

fn validate_table(table: &str) -> Result<(), PersistenceError> {
    let identifier = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|part| identifier(part)) {
        Ok(())
    } else {
        Err(PersistenceError::InvalidTable(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::currency_pair::CurrencyPair;

    fn rate(day: u32, value: f64, quote: &str) -> ExchangeRate {
        ExchangeRate::new(
            NaiveDate::from_ymd_opt(2023, 10, day).unwrap(),
            value,
            CurrencyPair::new("EUR", quote).unwrap(),
            "ECB API",
        )
        .created_at(Utc.with_ymd_and_hms(2023, 10, 10, 8, 30, 15).unwrap())
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ecb-rates-{}-{name}.jsonl", std::process::id()))
    }

    #[test]
    fn record_uses_persisted_layout() {
        let record = ExchangeRateRecord::from(&rate(5, 0.866, "GBP"));

        assert_eq!(
            record,
            ExchangeRateRecord {
                date: "2023-10-05".to_string(),
                exchange_rate: 0.866,
                base_currency: "EUR".to_string(),
                quote_currency: "GBP".to_string(),
                source: "ECB API".to_string(),
                creation_date: "2023-10-10 08:30:15".to_string(),
            }
        );
    }

    #[test]
    fn parses_write_disposition() {
        assert_eq!("append".parse::<WriteDisposition>(), Ok(WriteDisposition::Append));
        assert_eq!(" REPLACE ".parse::<WriteDisposition>(), Ok(WriteDisposition::Replace));
        assert!("upsert".parse::<WriteDisposition>().is_err());
        assert_eq!(WriteDisposition::default(), WriteDisposition::Append);
    }

    #[test]
    fn validates_table_names() {
        for table in ["raw.exchange_rates", "exchange_rates", "_raw.rates_2"] {
            assert!(validate_table(table).is_ok(), "{table}");
        }
        for table in ["", "a.b.c", "raw.", "1raw.rates", "rates; DROP TABLE x", "raw.ex-rates"] {
            assert!(
                matches!(validate_table(table), Err(PersistenceError::InvalidTable(_))),
                "{table}"
            );
        }
    }

    #[tokio::test]
    async fn json_lines_appends_records() {
        let path = temp_path("append");
        let _ = std::fs::remove_file(&path);
        let destination = JsonLinesDestination::new(&path);

        destination
            .load_exchange_rates(&[rate(5, 0.866, "GBP"), rate(6, 0.868, "GBP")])
            .await
            .unwrap();
        destination
            .load_exchange_rates(&[rate(5, 0.866, "GBP")])
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            serde_json::json!({
                "date": "2023-10-06",
                "exchange_rate": 0.868,
                "base_currency": "EUR",
                "quote_currency": "GBP",
                "source": "ECB API",
                "creation_date": "2023-10-10 08:30:15",
            })
        );
    }

    #[tokio::test]
    async fn memory_keeps_every_load() {
        let destination = MemoryDestination::new();

        destination
            .load_exchange_rates(&[rate(5, 0.866, "GBP")])
            .await
            .unwrap();
        destination
            .load_exchange_rates(&[rate(5, 0.866, "GBP"), rate(5, 1.05, "USD")])
            .await
            .unwrap();

        assert_eq!(destination.loads(), 2);
        assert_eq!(destination.rates().len(), 3);
    }

    #[tokio::test]
    #[ignore = "needs a PostgreSQL instance in DATABASE_URL"]
    async fn postgres_append_then_replace() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        let table = format!("exchange_rates_test_{}", std::process::id());
        let count = format!("SELECT COUNT(*) FROM {table}");
        let rates = vec![rate(5, 0.866, "GBP"), rate(6, 0.868, "GBP"), rate(6, 1.05, "USD")];

        let append = PgDestination::new(pool.clone(), &table).unwrap();
        append.ensure_table().await.unwrap();
        append.load_exchange_rates(&rates).await.unwrap();
        append.load_exchange_rates(&rates).await.unwrap();
        let stored: i64 = sqlx::query_scalar(&count).fetch_one(&pool).await.unwrap();
        assert_eq!(stored, 6);

        let replace = PgDestination::new(pool.clone(), &table)
            .unwrap()
            .with_disposition(WriteDisposition::Replace);
        replace.load_exchange_rates(&rates).await.unwrap();
        let stored: i64 = sqlx::query_scalar(&count).fetch_one(&pool).await.unwrap();
        assert_eq!(stored, 3);

        let row: (NaiveDate, f64, String, String) = sqlx::query_as(&format!(
            "SELECT date, exchange_rate, base_currency, quote_currency FROM {table} ORDER BY date, quote_currency LIMIT 1"
        ))
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(
            row,
            (
                NaiveDate::from_ymd_opt(2023, 10, 5).unwrap(),
                0.866,
                "EUR".to_string(),
                "GBP".to_string()
            )
        );

        sqlx::query(&format!("DROP TABLE {table}"))
            .execute(&pool)
            .await
            .unwrap();
    }
}
