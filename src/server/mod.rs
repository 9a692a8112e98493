pub mod endpoint;
pub mod ledger;
pub mod router;

pub use ledger::RequestLedger;
pub use router::Router;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

use crate::config::BenchConfig;
use crate::security;

/// The benchmark server: one endpoint per transport, all dispatching into
/// a shared [`Router`].
pub struct BenchServer {
    config: BenchConfig,
    router: Arc<Router>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

impl BenchServer {
    pub fn new(config: BenchConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Self {
            config,
            router: Arc::new(Router::new()),
            shutdown_tx: Some(shutdown_tx),
            shutdown_rx: Some(shutdown_rx),
        }
    }

    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    /// Hands out the shutdown sender. Sending on it stops `run`.
    pub fn shutdown_handle(&mut self) -> Option<mpsc::Sender<()>> {
        self.shutdown_tx.take()
    }

    /// Binds all four endpoints and serves until a shutdown signal arrives
    /// or an endpoint fails.
    pub async fn run(&mut self, bind_host: &str) -> Result<()> {
        let mut shutdown_rx = self
            .shutdown_rx
            .take()
            .ok_or_else(|| anyhow!("server already started"))?;

        let udp = UdpSocket::bind((bind_host, self.config.ports.udp))
            .await
            .with_context(|| format!("binding udp endpoint on port {}", self.config.ports.udp))?;
        let tcp = TcpListener::bind((bind_host, self.config.ports.tcp))
            .await
            .with_context(|| format!("binding tcp endpoint on port {}", self.config.ports.tcp))?;
        let tls_listener = TcpListener::bind((bind_host, self.config.ports.tls))
            .await
            .with_context(|| format!("binding tls endpoint on port {}", self.config.ports.tls))?;
        let tls_acceptor = TlsAcceptor::from(Arc::new(security::tls::server_config()?));
        let dtls_addr = format!("{bind_host}:{}", self.config.ports.dtls);
        let dtls_listener = webrtc_dtls::listener::listen(dtls_addr, security::dtls::server_config()?)
            .await
            .with_context(|| format!("binding dtls endpoint on port {}", self.config.ports.dtls))?;

        let mut udp_task = tokio::spawn(endpoint::run_udp(udp, self.router()));
        let mut tcp_task = tokio::spawn(endpoint::run_tcp(tcp, self.router()));
        let mut tls_task = tokio::spawn(endpoint::run_tls(tls_listener, tls_acceptor, self.router()));
        let mut dtls_task = tokio::spawn(endpoint::run_dtls(dtls_listener, self.router()));
        info!("all endpoints up");

        tokio::select! {
            _ = shutdown_rx.recv() => info!("shutdown signal received, stopping endpoints"),
            result = &mut udp_task => log_endpoint_exit("udp", result),
            result = &mut tcp_task => log_endpoint_exit("tcp", result),
            result = &mut tls_task => log_endpoint_exit("tls", result),
            result = &mut dtls_task => log_endpoint_exit("dtls", result),
        }

        udp_task.abort();
        tcp_task.abort();
        tls_task.abort();
        dtls_task.abort();
        info!("server stopped");
        Ok(())
    }
}

fn log_endpoint_exit(name: &str, result: Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!(endpoint = name, "endpoint loop ended"),
        Ok(Err(e)) => error!(endpoint = name, error = %e, "endpoint failed"),
        Err(e) => error!(endpoint = name, error = %e, "endpoint task aborted"),
    }
}
