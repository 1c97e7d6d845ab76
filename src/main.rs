mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use linguabox::config::{Config, TelemetryConfig};
use tracing_subscriber::EnvFilter;

fn init_tracing(telemetry: &TelemetryConfig) {
    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&telemetry.log_filter));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = if telemetry.json_logs {
        builder.json().with_target(false).try_init()
    } else {
        builder.try_init()
    };
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match cli.config.clone() {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    init_tracing(&config.telemetry);

    match cli.command {
        Commands::Server(args) => {
            let address = args.address.unwrap_or(config.server.bind_addr);
            linguabox::api::run(config, address).await?
        }
    }

    Ok(())
}
