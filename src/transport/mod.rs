pub mod dtls;
pub mod tcp;
pub mod tls;
pub mod udp;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::protocol::message::{Request, Response};
use crate::protocol::Protocol;
use crate::security::SecurityMode;

pub use dtls::DtlsConnector;
pub use tcp::TcpConnector;
pub use tls::TlsConnector;
pub use udp::UdpConnector;

/// An established exchange channel to the server. Implementations own
/// whatever socket/session state the transport needs; a value that returned
/// an error should be discarded and redialed.
#[async_trait]
pub trait Connection: Send {
    /// One request/response round trip.
    async fn exchange(&mut self, request: &Request) -> Result<Response>;

    async fn close(&mut self) -> Result<()>;
}

/// Dials fresh connections for one transport/security stack.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

pub fn connector_for(protocol: Protocol, host: &str, port: u16) -> Arc<dyn Connector> {
    match protocol {
        Protocol::Udp => Arc::new(UdpConnector::new(host, port)),
        Protocol::DtlsPsk => Arc::new(DtlsConnector::new(host, port, SecurityMode::PreSharedKey)),
        Protocol::DtlsRpk => Arc::new(DtlsConnector::new(host, port, SecurityMode::RawPublicKey)),
        Protocol::DtlsX509 => Arc::new(DtlsConnector::new(host, port, SecurityMode::Certificate)),
        Protocol::Tcp => Arc::new(TcpConnector::new(host, port)),
        Protocol::Tls => Arc::new(TlsConnector::new(host, port)),
    }
}
