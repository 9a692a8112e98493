pub mod client;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod security;
pub mod server;
pub mod transport;

mod util;

pub use config::BenchConfig;
