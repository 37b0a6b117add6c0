//! perpline - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Live market data relay and risk service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PERPLINE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before the first wss:// connection
    perpline_bridge::init_crypto();

    let args = Args::parse();

    perpline_telemetry::init_logging()?;

    info!("Starting perpline v{}", env!("CARGO_PKG_VERSION"));

    let config = perpline_server::AppConfig::load(args.config)?;
    info!(
        port = config.gateway.port,
        change_feed = config.change_feed.enabled,
        assets = config.price.assets.len(),
        "Configuration loaded"
    );

    let app = perpline_server::Application::new(config)?;
    app.run().await?;

    Ok(())
}
