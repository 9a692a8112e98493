use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber for a binary. `RUST_LOG` wins when
/// set; otherwise `verbose` widens the default filter.
pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "tbench=trace,debug"
    } else {
        "tbench=info,warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
