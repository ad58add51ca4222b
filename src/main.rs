use anyhow::Result;
use clap::Parser;
use ecb_rates::config::Settings;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv_override().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::Cli::parse();
    let settings = Settings::from_env()?;

    if let Err(err) = cli.command.run(&settings).await {
        log::error!("Next error has occurred: {:#}", err);
        return Err(err);
    }

    Ok(())
}
