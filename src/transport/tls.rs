use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rustls_pki_types::ServerName;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::protocol::message::{read_frame, Frame, Request, Response};
use crate::security;

use super::{Connection, Connector};

/// TLS over TCP via rustls. The client config is built once per dial so
/// environment-provided trust anchors are picked up without caching stale
/// session state across resets.
pub struct TlsConnector {
    host: String,
    port: u16,
}

impl TlsConnector {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let config = security::tls::client_config()?;
        let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("connecting to {}:{}", self.host, self.port))?;
        stream.set_nodelay(true).context("setting TCP_NODELAY")?;
        let server_name = ServerName::try_from(self.host.clone())
            .with_context(|| format!("invalid server name {}", self.host))?;
        let stream = connector
            .connect(server_name, stream)
            .await
            .context("TLS handshake")?;
        debug!(peer = %self.host, port = self.port, "tls session established");
        Ok(Box::new(TlsConnection { stream }))
    }
}

struct TlsConnection {
    stream: TlsStream<TcpStream>,
}

#[async_trait]
impl Connection for TlsConnection {
    async fn exchange(&mut self, request: &Request) -> Result<Response> {
        let frame = request.encode().context("encoding request")?;
        self.stream.write_all(&frame).await.context("writing request frame")?;
        match read_frame(&mut self.stream).await.context("reading response frame")? {
            Frame::Response(response) => Ok(response),
            Frame::Request(_) => bail!("peer sent a request frame instead of a response"),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await.context("closing TLS stream")
    }
}
