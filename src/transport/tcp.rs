use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::message::{read_frame, Frame, Request, Response};

use super::{Connection, Connector};

/// Framed request/response exchanges over a TCP stream.
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("connecting to {}", self.addr))?;
        stream.set_nodelay(true).context("setting TCP_NODELAY")?;
        debug!(peer = %self.addr, "tcp connection established");
        Ok(Box::new(TcpConnection { stream }))
    }
}

struct TcpConnection {
    stream: TcpStream,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn exchange(&mut self, request: &Request) -> Result<Response> {
        let frame = request.encode().context("encoding request")?;
        self.stream.write_all(&frame).await.context("writing request frame")?;
        match read_frame(&mut self.stream).await.context("reading response frame")? {
            Frame::Response(response) => Ok(response),
            Frame::Request(_) => bail!("peer sent a request frame instead of a response"),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await.context("closing TCP stream")
    }
}
