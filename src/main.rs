// edfl-gate - main.rs
// Installs logging, parses the command line and hands off to the CLI dispatcher.

use clap::Parser;
use edfl_gate::cli::{dispatch, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    dispatch(cli).await?;
    Ok(())
}
