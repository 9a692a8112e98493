pub mod error;
pub mod message;

pub use error::ProtocolError;
pub use message::{Frame, Method, Request, Response, StatusCode};

use std::fmt;
use std::time::Duration;

use crate::security::SecurityMode;

/// The transport/security bindings the benchmark exercises. The display
/// name doubles as the server resource path for the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    DtlsPsk,
    DtlsRpk,
    DtlsX509,
    Tcp,
    Tls,
}

impl Protocol {
    pub const ALL: [Protocol; 6] = [
        Protocol::Udp,
        Protocol::DtlsPsk,
        Protocol::DtlsRpk,
        Protocol::DtlsX509,
        Protocol::Tcp,
        Protocol::Tls,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Protocol::Udp => "udp",
            Protocol::DtlsPsk => "dtls+psk",
            Protocol::DtlsRpk => "dtls+rpk",
            Protocol::DtlsX509 => "dtls+x509",
            Protocol::Tcp => "tcp",
            Protocol::Tls => "tls",
        }
    }

    pub fn long_payload_path(&self) -> String {
        format!("{}longPayload", self.path())
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Udp => 5683,
            Protocol::DtlsPsk | Protocol::DtlsRpk | Protocol::DtlsX509 => 5684,
            Protocol::Tcp => 5685,
            Protocol::Tls => 5686,
        }
    }

    /// Whether exchanges ride an established connection whose state can
    /// desynchronize after a missed reply.
    pub fn connection_oriented(&self) -> bool {
        !matches!(self, Protocol::Udp)
    }

    /// Whether the transport performs a security handshake whose session
    /// state the keep-alive controller manages.
    pub fn handshake_secured(&self) -> bool {
        self.security_mode().is_some()
    }

    pub fn security_mode(&self) -> Option<SecurityMode> {
        match self {
            Protocol::DtlsPsk => Some(SecurityMode::PreSharedKey),
            Protocol::DtlsRpk => Some(SecurityMode::RawPublicKey),
            Protocol::DtlsX509 | Protocol::Tls => Some(SecurityMode::Certificate),
            Protocol::Udp | Protocol::Tcp => None,
        }
    }

    pub fn default_request_timeout() -> Duration {
        Duration::from_secs(10)
    }

    pub fn default_long_payload_timeout() -> Duration {
        Duration::from_secs(180)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_distinct() {
        let mut paths: Vec<&str> = Protocol::ALL.iter().map(|p| p.path()).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), Protocol::ALL.len());
    }

    #[test]
    fn security_classification() {
        assert!(!Protocol::Udp.connection_oriented());
        assert!(Protocol::Tcp.connection_oriented());
        assert!(!Protocol::Tcp.handshake_secured());
        assert!(Protocol::DtlsRpk.handshake_secured());
        assert_eq!(Protocol::Tls.security_mode(), Some(SecurityMode::Certificate));
        assert_eq!(Protocol::Udp.security_mode(), None);
    }
}
