use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::info;

use tbench::server::BenchServer;
use tbench::{logging, BenchConfig};

#[derive(Parser, Debug)]
#[command(name = "tbench-server", about = "Transport benchmark server", version)]
struct Args {
    /// Address to bind all endpoints on
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let mut config = match &args.config {
        Some(path) => BenchConfig::load_from_file(path)?,
        None => BenchConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;

    info!(bind = %args.bind, "starting benchmark server");
    let mut server = BenchServer::new(config);
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("received CTRL+C, shutting down");
            if let Some(tx) = shutdown {
                let _ = tx.send(()).await;
            }
        }
    });

    server.run(&args.bind).await
}
