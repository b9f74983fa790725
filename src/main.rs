use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use readygate::{config::Config, metrics, server::Server};

#[derive(Parser, Debug)]
#[command(name = "readygate")]
#[command(about = "Reverse proxy that holds clients in a waiting room or install wizard until the backend is ready")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(args.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    info!("Loading configuration from {:?}", args.config);

    let config = Config::load(&args.config)?;

    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    if let Some(ref metrics_config) = config.metrics {
        info!("Starting Prometheus metrics server on {}", metrics_config.address);
        if let Err(e) = metrics::start_metrics_server(&metrics_config.address) {
            warn!("Failed to start metrics server: {}. Continuing without metrics.", e);
        }
    }

    info!(
        "Gating cluster '{}' (waiting room {}, install wizard {})",
        config.gate.cluster, config.gate.wait_path, config.gate.install_path
    );

    let server = Server::new(config, args.config);
    server.run().await?;

    Ok(())
}
