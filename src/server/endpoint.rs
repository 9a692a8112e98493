//! Per-transport accept/serve loops. Each loop dispatches decoded requests
//! into the shared [`Router`]; stream and DTLS listeners spawn one task per
//! connection.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};
use webrtc_util::conn::Listener;
use webrtc_util::Conn;

use crate::protocol::message::{Frame, Response, StatusCode, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::protocol::message::read_frame;
use crate::transport::dtls::{send_frame, FrameAssembler};

use super::router::Router;

pub async fn run_udp(socket: UdpSocket, router: Arc<Router>) -> Result<()> {
    info!(addr = %socket.local_addr().context("udp local addr")?, "udp endpoint listening");
    let mut buf = vec![0u8; HEADER_SIZE + MAX_PAYLOAD_SIZE];
    loop {
        let (n, peer) = socket.recv_from(&mut buf).await.context("udp receive")?;
        let response = match Frame::decode(&buf[..n]) {
            Ok(Frame::Request(request)) => router.handle(&request),
            Ok(Frame::Response(_)) => {
                debug!(%peer, "ignoring stray response frame");
                continue;
            }
            Err(e) => {
                debug!(%peer, error = %e, "undecodable datagram");
                Response::new(StatusCode::BAD_REQUEST, Bytes::new())
            }
        };
        match response.encode() {
            Ok(frame) => {
                if let Err(e) = socket.send_to(&frame, peer).await {
                    warn!(%peer, error = %e, "failed to send udp response");
                }
            }
            Err(e) => warn!(%peer, error = %e, "failed to encode response"),
        }
    }
}

pub async fn run_tcp(listener: TcpListener, router: Arc<Router>) -> Result<()> {
    info!(addr = %listener.local_addr().context("tcp local addr")?, "tcp endpoint listening");
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "tcp connection accepted");
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, error = %e, "failed to set TCP_NODELAY");
                }
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    if let Err(e) = serve_stream(stream, &router).await {
                        debug!(%peer, error = %e, "tcp connection closed");
                    }
                });
            }
            Err(e) => error!(error = %e, "failed to accept tcp connection"),
        }
    }
}

pub async fn run_tls(listener: TcpListener, acceptor: TlsAcceptor, router: Arc<Router>) -> Result<()> {
    info!(addr = %listener.local_addr().context("tls local addr")?, "tls endpoint listening");
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let acceptor = acceptor.clone();
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(stream) => {
                            debug!(%peer, "tls session established");
                            if let Err(e) = serve_stream(stream, &router).await {
                                debug!(%peer, error = %e, "tls connection closed");
                            }
                        }
                        Err(e) => debug!(%peer, error = %e, "tls handshake failed"),
                    }
                });
            }
            Err(e) => error!(error = %e, "failed to accept tls connection"),
        }
    }
}

pub async fn run_dtls<L>(listener: L, router: Arc<Router>) -> Result<()>
where
    L: Listener + Send + Sync + 'static,
{
    let addr = listener.addr().await.context("dtls local addr")?;
    info!(%addr, "dtls endpoint listening");
    loop {
        match listener.accept().await {
            Ok((conn, peer)) => {
                debug!(%peer, "dtls session established");
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    if let Err(e) = serve_datagram_conn(conn, &router).await {
                        debug!(%peer, error = %e, "dtls connection closed");
                    }
                });
            }
            Err(e) => error!(error = %e, "failed to accept dtls connection"),
        }
    }
}

/// Serves back-to-back frames on one stream until the peer disconnects.
async fn serve_stream<S>(mut stream: S, router: &Router) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let response = respond(frame, router);
        let encoded = response.encode().context("encoding response")?;
        stream.write_all(&encoded).await.context("writing response frame")?;
    }
}

/// Serves reassembled frames on one DTLS session until it closes.
async fn serve_datagram_conn(conn: Arc<dyn Conn + Send + Sync>, router: &Router) -> Result<()> {
    let mut assembler = FrameAssembler::new();
    let mut chunk = vec![0u8; 16 * 1024];
    loop {
        let n = conn.recv(&mut chunk).await.context("receiving DTLS record")?;
        assembler.push(&chunk[..n]);
        while let Some(frame) = assembler.take_frame().context("decoding request")? {
            let response = respond(frame, router);
            let encoded = response.encode().context("encoding response")?;
            send_frame(conn.as_ref(), &encoded).await?;
        }
    }
}

fn respond(frame: Frame, router: &Router) -> Response {
    match frame {
        Frame::Request(request) => router.handle(&request),
        Frame::Response(_) => Response::new(StatusCode::BAD_REQUEST, Bytes::new()),
    }
}
