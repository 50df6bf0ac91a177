use anyhow::Result;
use clap::Parser;
use congedo::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    congedo::telemetry::init(&cli.log_level)?;
    cli.run().await
}
