use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gpt_relay_bot::config::Config;
use gpt_relay_bot::runner::ServiceRunner;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(severity = "critical", "{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn start() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    info!(?config, "🤖 starting bot");
    ServiceRunner::from_config(&config).run().await?;
    Ok(())
}
