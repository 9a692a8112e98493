use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use tbench::client::{dispatcher, Dispatcher};
use tbench::{logging, BenchConfig};

#[derive(Parser, Debug)]
#[command(name = "tbench-client", about = "Interactive transport benchmark client", version)]
struct Args {
    /// Benchmark server host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

// single-threaded on purpose: request timings must not share the runtime
// with unrelated work
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let mut config = match &args.config {
        Some(path) => BenchConfig::load_from_file(path)?,
        None => BenchConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(host) = args.host {
        config.host = host;
    }
    config.validate()?;

    info!(host = %config.host, "benchmark client ready");
    dispatcher::usage();

    let mut dispatcher = Dispatcher::new(config);
    dispatcher.run(tokio::io::stdin()).await
}
