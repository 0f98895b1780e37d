use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
mod config;
mod discord;
mod health;
mod logs;
mod loki;
mod monitor;
mod presence;
mod render;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::new();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = config::Config::from_env()?;
    info!(
        "polling {} every {:?} with {:?} lookback",
        config.loki_url, config.poll_period, config.lookback
    );

    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(port).await {
            error!("liveness endpoint stopped: {e:#}");
        }
    });

    let loki = loki::LokiClient::new(&config.loki_url, &config.loki_selector, config.loki_timeout)?;
    let monitor = Arc::new(monitor::Monitor::new(loki, config.lookback));
    let mut client = discord::create_client(&config, monitor).await?;
    client.start().await?;
    Ok(())
}
