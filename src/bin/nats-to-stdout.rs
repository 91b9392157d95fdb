//! nats-to-stdout - print a NATS JetStream subject line by line
//!
//! stdout carries message payloads only; all logging goes to stderr.

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nats_stdout_bridge::{bridge, BridgeConfig, Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load environment variables before clap reads them
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match BridgeConfig::from_cli(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            process::exit(1);
        }
    };

    tracing::info!(
        url = %config.nats_url,
        subject = %config.subject,
        durable = %config.durable,
        limit = ?config.limit,
        "Starting bridge"
    );

    if let Err(e) = bridge::run(config).await {
        tracing::error!("{}", e);
        process::exit(1);
    }
}
