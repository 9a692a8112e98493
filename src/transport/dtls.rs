use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::debug;
use webrtc_dtls::conn::DTLSConn;
use webrtc_util::Conn;

use crate::protocol::error::ProtocolError;
use crate::protocol::message::{frame_len, Frame, Request, Response};
use crate::security::{self, SecurityMode};

use super::{Connection, Connector};

/// Frames larger than one DTLS record are sent in chunks of this size and
/// reassembled from the record stream on the far side.
pub const RECORD_CHUNK: usize = 4096;

/// DTLS over a connected UDP socket via webrtc-dtls. The handshake runs in
/// the dial, so dropping the connection and redialing is what forces a
/// fresh session.
pub struct DtlsConnector {
    addr: String,
    host: String,
    mode: SecurityMode,
}

impl DtlsConnector {
    pub fn new(host: &str, port: u16, mode: SecurityMode) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            host: host.to_string(),
            mode,
        }
    }
}

#[async_trait]
impl Connector for DtlsConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("binding local UDP socket")?;
        socket
            .connect(&self.addr)
            .await
            .with_context(|| format!("connecting UDP socket to {}", self.addr))?;
        let mut config = security::dtls::client_config(self.mode)?;
        config.server_name = self.host.clone();
        let conn = DTLSConn::new(Arc::new(socket), config, true, None)
            .await
            .context("DTLS handshake")?;
        debug!(peer = %self.addr, mode = ?self.mode, "dtls session established");
        Ok(Box::new(DtlsConnection {
            conn,
            assembler: FrameAssembler::new(),
        }))
    }
}

struct DtlsConnection {
    conn: DTLSConn,
    assembler: FrameAssembler,
}

#[async_trait]
impl Connection for DtlsConnection {
    async fn exchange(&mut self, request: &Request) -> Result<Response> {
        let frame = request.encode().context("encoding request")?;
        send_frame(&self.conn, &frame).await?;
        self.assembler.clear();
        let mut chunk = vec![0u8; 16 * 1024];
        loop {
            let n = self
                .conn
                .recv(&mut chunk)
                .await
                .context("receiving DTLS record")?;
            self.assembler.push(&chunk[..n]);
            if let Some(frame) = self.assembler.take_frame().context("decoding response")? {
                match frame {
                    Frame::Response(response) => return Ok(response),
                    Frame::Request(_) => bail!("peer sent a request frame instead of a response"),
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.conn.close().await.context("closing DTLS session")
    }
}

/// Writes one frame, split into record-sized chunks.
pub(crate) async fn send_frame(conn: &(dyn Conn + Send + Sync), frame: &[u8]) -> Result<()> {
    for chunk in frame.chunks(RECORD_CHUNK) {
        conn.send(chunk).await.context("sending DTLS record")?;
    }
    Ok(())
}

/// Reassembles self-framing messages from record-sized chunks.
pub(crate) struct FrameAssembler {
    pending: Vec<u8>,
}

impl FrameAssembler {
    pub(crate) fn new() -> Self {
        Self { pending: Vec::new() }
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Pops the next complete frame, or `None` when more chunks are needed.
    pub(crate) fn take_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let total = match frame_len(&self.pending)? {
            Some(total) if self.pending.len() >= total => total,
            _ => return Ok(None),
        };
        let frame = Frame::decode(&self.pending[..total])?;
        self.pending.drain(..total);
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::protocol::message::StatusCode;

    #[test]
    fn assembler_reassembles_split_frames() {
        let response = Response::new(StatusCode::CONTENT, Bytes::from(vec![b'x'; 10_000]));
        let encoded = response.encode().unwrap();
        let mut assembler = FrameAssembler::new();
        for chunk in encoded.chunks(RECORD_CHUNK) {
            assembler.push(chunk);
        }
        match assembler.take_frame().unwrap() {
            Some(Frame::Response(decoded)) => assert_eq!(decoded, response),
            other => panic!("unexpected frame: {other:?}"),
        }
        assert!(assembler.take_frame().unwrap().is_none());
    }

    #[test]
    fn assembler_holds_back_partial_frames() {
        let encoded = Request::get("dtls+psk").encode().unwrap();
        let mut assembler = FrameAssembler::new();
        assembler.push(&encoded[..4]);
        assert!(assembler.take_frame().unwrap().is_none());
        assembler.push(&encoded[4..]);
        assert!(assembler.take_frame().unwrap().is_some());
    }

    #[test]
    fn assembler_yields_back_to_back_frames() {
        let mut bytes = Request::get("udp").encode().unwrap();
        bytes.extend(Request::post("udp", Bytes::from_static(b"0:1")).encode().unwrap());
        let mut assembler = FrameAssembler::new();
        assembler.push(&bytes);
        assert!(assembler.take_frame().unwrap().is_some());
        assert!(assembler.take_frame().unwrap().is_some());
        assert!(assembler.take_frame().unwrap().is_none());
    }
}
