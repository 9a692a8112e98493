use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::protocol::Protocol;

/// Benchmark configuration shared by the client and server binaries.
/// Defaults cover the reference deployment; a TOML file and `TBENCH_*`
/// environment variables override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Remote host the client targets. The server binds its own address.
    pub host: String,
    pub ports: PortConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub udp: u16,
    pub dtls: u16,
    pub tcp: u16,
    pub tls: u16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-request limit for posts and count queries.
    pub request: Duration,
    /// Limit for long-payload fetches.
    pub long_payload: Duration,
    /// Idle period after which a secured session is handshaken afresh.
    pub idle_resume: Duration,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            ports: PortConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            udp: Protocol::Udp.default_port(),
            dtls: Protocol::DtlsPsk.default_port(),
            tcp: Protocol::Tcp.default_port(),
            tls: Protocol::Tls.default_port(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Protocol::default_request_timeout(),
            long_payload: Protocol::default_long_payload_timeout(),
            idle_resume: Duration::from_secs(30),
        }
    }
}

impl PortConfig {
    pub fn port_for(&self, protocol: Protocol) -> u16 {
        match protocol {
            Protocol::Udp => self.udp,
            Protocol::DtlsPsk | Protocol::DtlsRpk | Protocol::DtlsX509 => self.dtls,
            Protocol::Tcp => self.tcp,
            Protocol::Tls => self.tls,
        }
    }
}

impl BenchConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("TBENCH_HOST") {
            self.host = host;
        }
        for (var, port) in [
            ("TBENCH_UDP_PORT", &mut self.ports.udp),
            ("TBENCH_DTLS_PORT", &mut self.ports.dtls),
            ("TBENCH_TCP_PORT", &mut self.ports.tcp),
            ("TBENCH_TLS_PORT", &mut self.ports.tls),
        ] {
            if let Ok(value) = std::env::var(var) {
                if let Ok(parsed) = value.parse() {
                    *port = parsed;
                }
            }
        }
        if let Ok(value) = std::env::var("TBENCH_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = value.parse() {
                self.timeouts.request = Duration::from_secs(secs);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            bail!("host must not be empty");
        }
        if self.ports.udp == self.ports.dtls {
            bail!("udp and dtls endpoints share a datagram port: {}", self.ports.udp);
        }
        if self.ports.tcp == self.ports.tls {
            bail!("tcp and tls endpoints share a stream port: {}", self.ports.tcp);
        }
        if self.timeouts.request.is_zero() || self.timeouts.long_payload.is_zero() {
            bail!("request timeouts must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = BenchConfig::default();
        config.validate().unwrap();
        assert_eq!(config.ports.udp, 5683);
        assert_eq!(config.ports.port_for(Protocol::DtlsRpk), 5684);
        assert_eq!(config.timeouts.request, Duration::from_secs(10));
        assert_eq!(config.timeouts.idle_resume, Duration::from_secs(30));
    }

    #[test]
    fn rejects_shared_datagram_port() {
        let mut config = BenchConfig::default();
        config.ports.dtls = config.ports.udp;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = BenchConfig::default();
        config.timeouts.request = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"bench.example\"\n\n[ports]\ntcp = 15685").unwrap();
        let config = BenchConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.host, "bench.example");
        assert_eq!(config.ports.tcp, 15685);
        assert_eq!(config.ports.udp, 5683);
    }

    #[test]
    fn rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = 42").unwrap();
        assert!(BenchConfig::load_from_file(file.path()).is_err());
    }
}
