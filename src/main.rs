use clap::Parser;
use tracing::debug;

use icewatch::cli::{run, Cli};
use icewatch::{init_tracing, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    debug!(config = ?config.public_profile(), "loaded configuration");

    run(cli, &config).await?;
    Ok(())
}
