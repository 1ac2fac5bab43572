use clap::Parser;
use log::{error, info};
use server::network::Server;
use shared::{MovementMode, WorldConfig};
use std::path::PathBuf;

/// Authoritative server for the Reef shared world
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// JSON file with world settings; flags below override it
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Tick period in milliseconds
    #[clap(short, long)]
    tick_millis: Option<u64>,
    /// Movement authority: "reported" or "keys"
    #[clap(short, long)]
    mode: Option<MovementMode>,
    /// Seed for fish placement and wandering
    #[clap(short, long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading world settings from {}", path.display());
            WorldConfig::load(path)?
        }
        None => WorldConfig::default(),
    };
    if let Some(tick_millis) = args.tick_millis {
        config.tick_millis = tick_millis;
    }
    if let Some(mode) = args.mode {
        config.movement_mode = mode;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
