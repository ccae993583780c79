//! Stash broker daemon.
//!
//! Owns the shared path store and serves client connections over a Unix
//! domain socket. Clients find the socket through the same resolution
//! the daemon uses to bind it.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use stash_broker::core::{BrokerConfig, BrokerCore};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Broker command line arguments.
#[derive(Parser, Debug)]
#[command(name = "stashd")]
#[command(about = "Shared hierarchical key-value store broker")]
struct Args {
	/// Socket path for IPC
	#[arg(short, long, value_name = "PATH")]
	socket: Option<PathBuf>,

	/// Callback timeout in seconds
	#[arg(short, long, value_name = "SECS", default_value_t = 5)]
	timeout: u64,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main(worker_threads = 4)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	tracing_subscriber::fmt()
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.init();

	info!("starting stashd");

	let socket_path = args
		.socket
		.unwrap_or_else(stash_proto::paths::default_socket_path);

	if let Some(parent) = socket_path.parent()
		&& !parent.exists()
	{
		std::fs::create_dir_all(parent)?;
	}

	info!(socket = %socket_path.display(), "IPC socket path");

	let core = BrokerCore::new_with_config(BrokerConfig {
		socket_path: socket_path.clone(),
		rpc_timeout: Duration::from_secs(args.timeout),
	});
	let shutdown = CancellationToken::new();

	info!("starting IPC server");
	stash_broker::ipc::serve(&socket_path, core, shutdown).await?;

	Ok(())
}
