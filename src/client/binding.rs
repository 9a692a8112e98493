use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::BenchConfig;
use crate::protocol::message::{Request, Response};
use crate::protocol::Protocol;
use crate::transport::{self, Connection, Connector};

/// What became of one posted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// No reply arrived before the deadline.
    NoResponse,
    /// A success-class reply arrived.
    Success,
    /// A reply arrived but carried an error status.
    Failure,
    /// The exchange faulted below the protocol layer.
    TransportError,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::NoResponse => "no-response",
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::TransportError => "transport-error",
        };
        f.write_str(name)
    }
}

/// One client-side endpoint of a transport variant. Owns at most one live
/// connection, dialing lazily on first use. All faults are absorbed into
/// [`Outcome`] values; nothing here panics or propagates errors upward.
pub struct ProtocolBinding {
    protocol: Protocol,
    connector: Arc<dyn Connector>,
    conn: Option<Box<dyn Connection>>,
    request_timeout: Duration,
    long_payload_timeout: Duration,
}

impl ProtocolBinding {
    pub fn new(protocol: Protocol, config: &BenchConfig) -> Self {
        let port = config.ports.port_for(protocol);
        Self {
            protocol,
            connector: transport::connector_for(protocol, &config.host, port),
            conn: None,
            request_timeout: config.timeouts.request,
            long_payload_timeout: config.timeouts.long_payload,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Posts `"<experiment>:<request>"` (plus optional padding after a
    /// newline) and classifies the result.
    pub async fn post(&mut self, experiment: u64, request_id: i64, padding: Option<&str>) -> Outcome {
        let body = match padding {
            Some(padding) => format!("{experiment}:{request_id}\n{padding}"),
            None => format!("{experiment}:{request_id}"),
        };
        let request = Request::post(self.protocol.path(), Bytes::from(body.into_bytes()));
        match self.exchange(&request, self.request_timeout).await {
            Ok(Some(response)) => {
                debug!(protocol = %self.protocol, code = %response.code, "post response");
                if response.code.is_success() {
                    Outcome::Success
                } else {
                    Outcome::Failure
                }
            }
            Ok(None) => {
                info!(protocol = %self.protocol, request_id, "no response to post");
                Outcome::NoResponse
            }
            Err(e) => {
                warn!(protocol = %self.protocol, request_id, error = %e, "post failed");
                Outcome::TransportError
            }
        }
    }

    /// Fetches the server's distinct-request count for `experiment`.
    /// `None` means the count is unknown (no usable response); a reachable
    /// server that has not seen the experiment yet reports `Some(0)`.
    pub async fn get(&mut self, experiment: u64) -> Option<u64> {
        let request = Request::get(self.protocol.path());
        match self.exchange(&request, self.request_timeout).await {
            Ok(Some(response)) if response.code.is_success() => {
                let text = String::from_utf8_lossy(&response.payload);
                Some(count_for(&text, experiment))
            }
            Ok(Some(response)) => {
                warn!(protocol = %self.protocol, code = %response.code, "unexpected status for count query");
                None
            }
            Ok(None) => {
                info!(protocol = %self.protocol, "no response to count query");
                None
            }
            Err(e) => {
                warn!(protocol = %self.protocol, error = %e, "count query failed");
                None
            }
        }
    }

    /// Fetches the constant long-payload body under the long deadline.
    pub async fn get_long_payload(&mut self) -> Outcome {
        let request = Request::get(&self.protocol.long_payload_path());
        match self.exchange(&request, self.long_payload_timeout).await {
            Ok(Some(response)) => {
                debug!(
                    protocol = %self.protocol,
                    code = %response.code,
                    bytes = response.payload.len(),
                    "long payload response"
                );
                if response.code.is_success() {
                    Outcome::Success
                } else {
                    Outcome::Failure
                }
            }
            Ok(None) => {
                info!(protocol = %self.protocol, "no response to long payload fetch");
                Outcome::NoResponse
            }
            Err(e) => {
                warn!(protocol = %self.protocol, error = %e, "long payload fetch failed");
                Outcome::TransportError
            }
        }
    }

    /// Tears down the live connection and dials a fresh one, so the next
    /// exchange pays full connection/handshake cost. Connectionless
    /// transports have nothing to reset.
    pub async fn reset(&mut self) {
        if !self.protocol.connection_oriented() {
            info!(protocol = %self.protocol, "reset is a no-op for connectionless transports");
            return;
        }
        self.drop_connection().await;
        match self.connector.connect().await {
            Ok(conn) => {
                debug!(protocol = %self.protocol, "reconnected after reset");
                self.conn = Some(conn);
            }
            Err(e) => {
                warn!(
                    protocol = %self.protocol,
                    error = %e,
                    "reconnect after reset failed, will retry on next use"
                );
            }
        }
    }

    /// Discards cached session state so the next exchange handshakes
    /// afresh.
    pub(crate) async fn invalidate_session(&mut self) {
        self.drop_connection().await;
    }

    /// One exchange under a deadline. `Ok(None)` is a timeout. A faulted
    /// or timed-out connection is discarded on every transport: the stale
    /// reply may still arrive, and reading it later would desynchronize
    /// request/response matching (for UDP, dropping the socket is what
    /// sheds the undelivered datagram).
    async fn exchange(&mut self, request: &Request, limit: Duration) -> Result<Option<Response>> {
        if self.conn.is_none() {
            self.conn = Some(self.connector.connect().await?);
        }
        let conn = self.conn.as_mut().context("connection slot empty")?;
        match tokio::time::timeout(limit, conn.exchange(request)).await {
            Ok(Ok(response)) => Ok(Some(response)),
            Ok(Err(e)) => {
                self.drop_connection().await;
                Err(e)
            }
            Err(_elapsed) => {
                self.drop_connection().await;
                Ok(None)
            }
        }
    }

    async fn drop_connection(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                debug!(protocol = %self.protocol, error = %e, "error closing connection");
            }
        }
    }
}

fn count_for(body: &str, experiment: u64) -> u64 {
    for line in body.lines() {
        if let Some((id, count)) = line.split_once(':') {
            if id.parse::<u64>() == Ok(experiment) {
                return count.parse().unwrap_or(0);
            }
        }
    }
    0
}
