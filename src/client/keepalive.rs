use std::time::{Duration, Instant};

use tracing::info;

use crate::config::BenchConfig;
use crate::protocol::Protocol;

use super::binding::{Outcome, ProtocolBinding};

/// Wraps a handshake-secured binding and discards its cached session when
/// it has sat idle past the threshold, so the next exchange performs a
/// full handshake instead of silently resuming a stale session. The idle
/// clock only starts once the binding has been used.
pub struct SessionKeepAlive {
    inner: ProtocolBinding,
    idle_threshold: Duration,
    last_used: Option<Instant>,
}

impl SessionKeepAlive {
    pub fn new(inner: ProtocolBinding, idle_threshold: Duration) -> Self {
        Self {
            inner,
            idle_threshold,
            last_used: None,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.inner.protocol()
    }

    pub async fn post(&mut self, experiment: u64, request_id: i64, padding: Option<&str>) -> Outcome {
        self.check_idle().await;
        let outcome = self.inner.post(experiment, request_id, padding).await;
        self.touch();
        outcome
    }

    pub async fn get(&mut self, experiment: u64) -> Option<u64> {
        self.check_idle().await;
        let count = self.inner.get(experiment).await;
        self.touch();
        count
    }

    pub async fn get_long_payload(&mut self) -> Outcome {
        self.check_idle().await;
        let outcome = self.inner.get_long_payload().await;
        self.touch();
        outcome
    }

    pub async fn reset(&mut self) {
        self.inner.reset().await;
        self.touch();
    }

    async fn check_idle(&mut self) {
        if let Some(last_used) = self.last_used {
            if last_used.elapsed() > self.idle_threshold {
                info!(
                    protocol = %self.inner.protocol(),
                    idle_secs = last_used.elapsed().as_secs(),
                    "session idle past threshold, forcing fresh handshake"
                );
                self.inner.invalidate_session().await;
            }
        }
    }

    fn touch(&mut self) {
        self.last_used = Some(Instant::now());
    }
}

/// A ready-to-use binding: plain for cleartext transports, keep-alive
/// wrapped for handshake-secured ones.
pub enum Binding {
    Direct(ProtocolBinding),
    KeptAlive(SessionKeepAlive),
}

impl Binding {
    pub fn for_protocol(protocol: Protocol, config: &BenchConfig) -> Self {
        let binding = ProtocolBinding::new(protocol, config);
        if protocol.handshake_secured() {
            Binding::KeptAlive(SessionKeepAlive::new(binding, config.timeouts.idle_resume))
        } else {
            Binding::Direct(binding)
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Binding::Direct(binding) => binding.protocol(),
            Binding::KeptAlive(binding) => binding.protocol(),
        }
    }

    pub async fn post(&mut self, experiment: u64, request_id: i64, padding: Option<&str>) -> Outcome {
        match self {
            Binding::Direct(binding) => binding.post(experiment, request_id, padding).await,
            Binding::KeptAlive(binding) => binding.post(experiment, request_id, padding).await,
        }
    }

    pub async fn get(&mut self, experiment: u64) -> Option<u64> {
        match self {
            Binding::Direct(binding) => binding.get(experiment).await,
            Binding::KeptAlive(binding) => binding.get(experiment).await,
        }
    }

    pub async fn get_long_payload(&mut self) -> Outcome {
        match self {
            Binding::Direct(binding) => binding.get_long_payload().await,
            Binding::KeptAlive(binding) => binding.get_long_payload().await,
        }
    }

    pub async fn reset(&mut self) {
        match self {
            Binding::Direct(binding) => binding.reset().await,
            Binding::KeptAlive(binding) => binding.reset().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BenchConfig;

    fn unreachable_config() -> BenchConfig {
        let mut config = BenchConfig::default();
        config.host = "127.0.0.1".to_string();
        // nothing listens on these ports, dials fail fast with refused
        config.ports.tcp = 1;
        config.ports.tls = 1;
        config
    }

    #[test]
    fn secured_protocols_get_the_keepalive_wrapper() {
        let config = BenchConfig::default();
        for protocol in Protocol::ALL {
            let binding = Binding::for_protocol(protocol, &config);
            assert_eq!(binding.protocol(), protocol);
            match binding {
                Binding::KeptAlive(_) => assert!(protocol.handshake_secured()),
                Binding::Direct(_) => assert!(!protocol.handshake_secured()),
            }
        }
    }

    #[tokio::test]
    async fn unreachable_server_yields_transport_error_not_panic() {
        let config = unreachable_config();
        let mut binding = Binding::for_protocol(Protocol::Tcp, &config);
        assert_eq!(binding.post(0, 0, None).await, Outcome::TransportError);
        assert_eq!(binding.get(0).await, None);
        // reset must leave the binding usable even though the dial fails
        binding.reset().await;
        assert_eq!(binding.post(0, 1, None).await, Outcome::TransportError);
    }

    #[tokio::test]
    async fn idle_check_runs_without_a_live_connection() {
        let config = unreachable_config();
        let binding = ProtocolBinding::new(Protocol::Tls, &config);
        let mut keepalive = SessionKeepAlive::new(binding, Duration::ZERO);
        assert_eq!(keepalive.post(0, 0, None).await, Outcome::TransportError);
        // last_used is now set and already past the zero threshold
        assert_eq!(keepalive.post(0, 1, None).await, Outcome::TransportError);
    }
}
