//! chatsync binary.
//!
//! # Usage
//!
//! ```bash
//! # Against a local server
//! chatsync --api-base http://localhost:8080/api/ --ws-url ws://localhost:8080/ws
//!
//! # No server: in-memory demo rooms
//! chatsync --demo --room dev
//! ```
//!
//! Lines typed on stdin are sent to the active room; `/help` lists commands.

use chatsync_cli::Args;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("chatsync starting");
    chatsync_cli::run(args).await?;

    Ok(())
}
