use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::protocol::message::{Frame, Request, Response, HEADER_SIZE, MAX_PAYLOAD_SIZE};

use super::{Connection, Connector};

/// Connected UDP socket, one frame per datagram.
pub struct UdpConnector {
    addr: String,
}

impl UdpConnector {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
        }
    }
}

#[async_trait]
impl Connector for UdpConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("binding local UDP socket")?;
        socket
            .connect(&self.addr)
            .await
            .with_context(|| format!("connecting UDP socket to {}", self.addr))?;
        debug!(peer = %self.addr, "udp socket ready");
        Ok(Box::new(UdpConnection { socket }))
    }
}

struct UdpConnection {
    socket: UdpSocket,
}

#[async_trait]
impl Connection for UdpConnection {
    async fn exchange(&mut self, request: &Request) -> Result<Response> {
        let frame = request.encode().context("encoding request")?;
        self.socket.send(&frame).await.context("sending datagram")?;
        let mut buf = vec![0u8; HEADER_SIZE + MAX_PAYLOAD_SIZE];
        let n = self.socket.recv(&mut buf).await.context("receiving datagram")?;
        match Frame::decode(&buf[..n]).context("decoding response datagram")? {
            Frame::Response(response) => Ok(response),
            Frame::Request(_) => bail!("peer sent a request frame instead of a response"),
        }
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
