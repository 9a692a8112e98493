use std::fmt;
use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::protocol::error::ProtocolError;

/// Fixed header: kind(1) | path_len-or-code(1) | payload_len(4, BE).
pub const HEADER_SIZE: usize = 6;

/// Upper bound on a single frame's payload.
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024;

/// Paths are length-prefixed with a single byte.
pub const MAX_PATH_SIZE: usize = 255;

const KIND_POST: u8 = 0x01;
const KIND_GET: u8 = 0x02;
const KIND_RESPONSE: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Post,
    Get,
}

/// CoAP-style status in a single byte: class in the top three bits,
/// detail in the bottom five. Class 2 is the success class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u8);

impl StatusCode {
    pub const CREATED: StatusCode = StatusCode(0x41); // 2.01
    pub const CONTENT: StatusCode = StatusCode(0x45); // 2.05
    pub const BAD_REQUEST: StatusCode = StatusCode(0x80); // 4.00
    pub const NOT_FOUND: StatusCode = StatusCode(0x84); // 4.04
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(0x85); // 4.05
    pub const INTERNAL_ERROR: StatusCode = StatusCode(0xa0); // 5.00

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.0 & 0x1f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub payload: Bytes,
}

impl Request {
    pub fn post(path: &str, payload: impl Into<Bytes>) -> Self {
        Self {
            method: Method::Post,
            path: path.to_string(),
            payload: payload.into(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self {
            method: Method::Get,
            path: path.to_string(),
            payload: Bytes::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.path.len() > MAX_PATH_SIZE {
            return Err(ProtocolError::PathTooLong(self.path.len()));
        }
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(self.payload.len()));
        }
        let kind = match self.method {
            Method::Post => KIND_POST,
            Method::Get => KIND_GET,
        };
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.path.len() + self.payload.len());
        write_header(&mut buf, kind, self.path.len() as u8, self.payload.len() as u32);
        buf.extend_from_slice(self.path.as_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub code: StatusCode,
    pub payload: Bytes,
}

impl Response {
    pub fn new(code: StatusCode, payload: impl Into<Bytes>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(self.payload.len()));
        }
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        write_header(&mut buf, KIND_RESPONSE, self.code.0, self.payload.len() as u32);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request(Request),
    Response(Response),
}

impl Frame {
    /// Decodes one frame from the start of `buf`. Trailing bytes beyond the
    /// frame's declared length are ignored.
    pub fn decode(buf: &[u8]) -> Result<Frame, ProtocolError> {
        let total = match frame_len(buf)? {
            Some(total) => total,
            None => {
                return Err(ProtocolError::Truncated {
                    needed: HEADER_SIZE,
                    have: buf.len(),
                })
            }
        };
        if buf.len() < total {
            return Err(ProtocolError::Truncated {
                needed: total,
                have: buf.len(),
            });
        }
        let kind = buf[0];
        let payload_len = read_payload_len(buf);
        match kind {
            KIND_POST | KIND_GET => {
                let path_len = buf[1] as usize;
                let path = std::str::from_utf8(&buf[HEADER_SIZE..HEADER_SIZE + path_len])
                    .map_err(|_| ProtocolError::InvalidPath)?
                    .to_string();
                let payload =
                    Bytes::copy_from_slice(&buf[HEADER_SIZE + path_len..HEADER_SIZE + path_len + payload_len]);
                let method = if kind == KIND_POST { Method::Post } else { Method::Get };
                Ok(Frame::Request(Request { method, path, payload }))
            }
            KIND_RESPONSE => {
                let payload = Bytes::copy_from_slice(&buf[HEADER_SIZE..HEADER_SIZE + payload_len]);
                Ok(Frame::Response(Response {
                    code: StatusCode(buf[1]),
                    payload,
                }))
            }
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

/// Total encoded length of the frame starting at `buf`, or `None` when the
/// header is not complete yet. Validates kind and payload bounds so stream
/// readers fail fast on garbage.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, ProtocolError> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }
    let payload_len = read_payload_len(buf);
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge(payload_len));
    }
    match buf[0] {
        KIND_POST | KIND_GET => Ok(Some(HEADER_SIZE + buf[1] as usize + payload_len)),
        KIND_RESPONSE => Ok(Some(HEADER_SIZE + payload_len)),
        other => Err(ProtocolError::UnknownKind(other)),
    }
}

/// Reads one complete frame from a stream transport.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Frame> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let total = frame_len(&header)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .unwrap_or(HEADER_SIZE);
    let mut buf = vec![0u8; total];
    buf[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut buf[HEADER_SIZE..]).await?;
    Frame::decode(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_header(buf: &mut Vec<u8>, kind: u8, second: u8, payload_len: u32) {
    buf.push(kind);
    buf.push(second);
    // writes into a Vec cannot fail
    let _ = buf.write_u32::<BigEndian>(payload_len);
}

fn read_payload_len(buf: &[u8]) -> usize {
    u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_roundtrip() {
        let request = Request::post("udp", Bytes::from_static(b"3:17"));
        let encoded = request.encode().unwrap();
        assert_eq!(encoded.len(), HEADER_SIZE + 3 + 4);
        match Frame::decode(&encoded).unwrap() {
            Frame::Request(decoded) => assert_eq!(decoded, request),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn get_roundtrip() {
        let request = Request::get("dtls+psk");
        let encoded = request.encode().unwrap();
        match Frame::decode(&encoded).unwrap() {
            Frame::Request(decoded) => {
                assert_eq!(decoded.method, Method::Get);
                assert_eq!(decoded.path, "dtls+psk");
                assert!(decoded.payload.is_empty());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn response_roundtrip() {
        let response = Response::new(StatusCode::CREATED, Bytes::from_static(b"3:17"));
        let encoded = response.encode().unwrap();
        match Frame::decode(&encoded).unwrap() {
            Frame::Response(decoded) => assert_eq!(decoded, response),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn truncated_frame_rejected() {
        let encoded = Request::post("udp", Bytes::from_static(b"1:1")).encode().unwrap();
        let err = Frame::decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
        assert!(matches!(
            Frame::decode(&encoded[..3]).unwrap_err(),
            ProtocolError::Truncated { .. }
        ));
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut encoded = Request::get("udp").encode().unwrap();
        encoded[0] = 0x7f;
        assert!(matches!(
            Frame::decode(&encoded).unwrap_err(),
            ProtocolError::UnknownKind(0x7f)
        ));
    }

    #[test]
    fn oversized_payload_rejected() {
        let response = Response::new(StatusCode::CONTENT, vec![0u8; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(
            response.encode().unwrap_err(),
            ProtocolError::PayloadTooLarge(_)
        ));
        // a forged header claiming an oversized payload fails before any read
        let mut header = vec![KIND_RESPONSE, StatusCode::CONTENT.0, 0xff, 0xff, 0xff, 0xff];
        header.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            Frame::decode(&header).unwrap_err(),
            ProtocolError::PayloadTooLarge(_)
        ));
    }

    #[test]
    fn status_classes() {
        assert!(StatusCode::CREATED.is_success());
        assert!(StatusCode::CONTENT.is_success());
        assert!(!StatusCode::BAD_REQUEST.is_success());
        assert!(!StatusCode::INTERNAL_ERROR.is_success());
        assert_eq!(StatusCode::CREATED.to_string(), "2.01");
        assert_eq!(StatusCode::NOT_FOUND.to_string(), "4.04");
    }

    #[tokio::test]
    async fn read_frame_from_stream() {
        let mut bytes = Request::post("tcp", Bytes::from_static(b"0:0")).encode().unwrap();
        bytes.extend(Response::new(StatusCode::CREATED, Bytes::from_static(b"0:0")).encode().unwrap());
        let mut cursor = &bytes[..];
        assert!(matches!(read_frame(&mut cursor).await.unwrap(), Frame::Request(_)));
        assert!(matches!(read_frame(&mut cursor).await.unwrap(), Frame::Response(_)));
        let eof = read_frame(&mut cursor).await.unwrap_err();
        assert_eq!(eof.kind(), io::ErrorKind::UnexpectedEof);
    }
}
