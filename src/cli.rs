use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use ecb_rates::config::Settings;
use ecb_rates::destination::{ExchangeRateDestination, JsonLinesDestination, PgDestination};
use ecb_rates::server::{self, AppState};
use ecb_rates::service::ingest_euro_rates;
use ecb_rates::transport::{ReqwestTransport, RetryPolicy, Transport};

#[derive(Debug, Parser)]
#[command(name = "ecb-rates", version, about = "Loads ECB euro reference rates into the warehouse")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch rates against the euro for the given currencies and load them.
    GetEcbRates(GetEcbRatesArgs),
    /// Accept scheduled Pub/Sub push messages over HTTP.
    Serve(ServeArgs),
}

#[derive(Debug, clap::Args)]
pub struct GetEcbRatesArgs {
    /// You can specify this option multiple times.
    #[arg(long = "currency")]
    currencies: Vec<String>,

    /// Days going back from today [default: LOOKBACK_DAYS or 10]
    #[arg(long)]
    days: Option<u32>,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Debug, clap::Args)]
pub struct ServeArgs {
    /// Address to listen on [default: BIND_ADDRESS or 0.0.0.0:8080]
    #[arg(long)]
    bind: Option<String>,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Debug, clap::Args)]
struct TargetArgs {
    /// Append newline-delimited JSON to this file instead of the database.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Create the destination table if it does not exist.
    #[arg(long, conflicts_with = "output")]
    create_table: bool,
}

impl Commands {
    pub async fn run(self, settings: &Settings) -> Result<()> {
        match self {
            Commands::GetEcbRates(args) => get_ecb_rates(args, settings).await,
            Commands::Serve(args) => serve(args, settings).await,
        }
    }
}

async fn get_ecb_rates(args: GetEcbRatesArgs, settings: &Settings) -> Result<()> {
    let currencies = if args.currencies.is_empty() {
        log::info!("No --currency given, using {:?}", settings.default_currencies);
        settings.default_currencies.clone()
    } else {
        args.currencies
    };
    let days = args.days.unwrap_or(settings.lookback_days);

    let destination = destination(&args.target, settings).await?;
    let transport = transport()?;

    ingest_euro_rates(
        destination.as_ref(),
        transport,
        &settings.ecb_api_url,
        &currencies,
        days,
    )
    .await?;
    log::info!("Process completed successfully");

    Ok(())
}

async fn serve(args: ServeArgs, settings: &Settings) -> Result<()> {
    let state = AppState {
        destination: destination(&args.target, settings).await?,
        transport: transport()?,
        ecb_api_url: settings.ecb_api_url.clone(),
        default_currencies: settings.default_currencies.clone(),
        default_lookback_days: settings.lookback_days,
    };
    let bind = args.bind.as_deref().unwrap_or(&settings.bind_address);

    server::serve(state, bind)
        .await
        .with_context(|| format!("Server on {bind} failed"))
}

fn transport() -> Result<Arc<dyn Transport>> {
    Ok(Arc::new(ReqwestTransport::new(RetryPolicy::default())?))
}

async fn destination(
    target: &TargetArgs,
    settings: &Settings,
) -> Result<Arc<dyn ExchangeRateDestination>> {
    if let Some(path) = &target.output {
        return Ok(Arc::new(JsonLinesDestination::new(path)));
    }

    let url = settings
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set unless --output is given")?;
    let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
    let destination = PgDestination::new(pool, &settings.exchange_rates_table)?
        .with_disposition(settings.write_disposition);
    if target.create_table {
        destination.ensure_table().await?;
    }

    Ok(Arc::new(destination))
}
