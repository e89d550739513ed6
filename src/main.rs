//! Stream CDC changes from a SQL Server database to stdout.
//!
//! Configuration via environment:
//! - `SQLSERVER_HOST` (default: localhost)
//! - `SQLSERVER_PORT` (default: 1433)
//! - `SQLSERVER_USER` (default: sa)
//! - `SQLSERVER_PASSWORD` (required)
//! - `SQLSERVER_DATABASE` (required)
//! - `CHANGESTREAM_TABLES` comma-separated capture instances
//!   (default: dbo_Employee)
//! - `CHANGESTREAM_POLL_INTERVAL_MS` (default: 1000)
//!
//! Ctrl-C requests a graceful stop: the poll loop completes the queue and
//! the consumer drains everything already fetched before exiting.

use anyhow::Context;
use changestream::sqlserver::{SqlServerConfig, SqlServerSource};
use changestream::{BatchConsumer, ChangePoller, PollerConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = SqlServerConfig::builder()
        .host(env_or("SQLSERVER_HOST", "localhost"))
        .port(
            env_or("SQLSERVER_PORT", "1433")
                .parse()
                .context("SQLSERVER_PORT must be a port number")?,
        )
        .username(env_or("SQLSERVER_USER", "sa"))
        .password(std::env::var("SQLSERVER_PASSWORD").context("SQLSERVER_PASSWORD is required")?)
        .database(std::env::var("SQLSERVER_DATABASE").context("SQLSERVER_DATABASE is required")?)
        .trust_server_certificate(true)
        .build()?;

    let tables: Vec<String> = env_or("CHANGESTREAM_TABLES", "dbo_Employee")
        .split(',')
        .map(|t| t.trim().to_string())
        .collect();
    let poll_config = PollerConfig::builder()
        .tables(tables)
        .poll_interval_ms(
            env_or("CHANGESTREAM_POLL_INTERVAL_MS", "1000")
                .parse()
                .context("CHANGESTREAM_POLL_INTERVAL_MS must be an integer")?,
        )
        .build()?;

    info!("connecting to {}", config.redacted_connection_string());
    let mut source = SqlServerSource::connect(&config).await?;
    source.verify_cdc_enabled().await?;

    let mut poller = ChangePoller::new(source, poll_config);
    let receiver = poller.take_batch_receiver().expect("batch receiver");
    poller.start().await?;

    let mut consumer = tokio::spawn(BatchConsumer::new(tokio::io::stdout()).run(receiver));

    // Run until Ctrl-C or until the pipeline terminates on its own.
    let consumer_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            None
        }
        result = &mut consumer => Some(result),
    };

    poller.request_stop();
    poller.join().await?;

    let consumer_result = match consumer_result {
        Some(result) => result,
        None => consumer.await,
    };
    consumer_result.context("consumer task panicked")??;

    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
