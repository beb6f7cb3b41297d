//! Main entry point for the catalog mirroring service.
//!
//! Loads the configuration, connects to the chain endpoint, and serves the
//! HTTP API on top of one shared mirroring facade.

use clap::Parser;
use mirror_config::Config;
use mirror_core::MirrorBuilder;
use std::path::PathBuf;

mod apis;
mod server;

/// Command-line arguments for the mirroring service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	// RUST_LOG wins over --log-level
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started mirror service");

	let config = Config::from_file(&args.config).await?;
	tracing::info!(
		network = %config.endpoint.network_name,
		chain_id = config.endpoint.chain_id,
		"Loaded configuration [{}]",
		config.service.id
	);

	let facade = MirrorBuilder::new(config.clone()).build().await?;

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			tokio::select! {
				result = server::start_server(api_config, facade) => {
					tracing::info!("API server finished");
					result?;
				}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Shutdown requested");
				}
			}
		},
		None => {
			tracing::info!("API disabled, waiting for shutdown signal");
			tokio::signal::ctrl_c().await?;
		},
	}

	tracing::info!("Stopped mirror service");
	Ok(())
}
