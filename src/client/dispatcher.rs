use std::collections::HashMap;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::config::BenchConfig;
use crate::protocol::Protocol;
use crate::util::random_alphabetic;

use super::experiment::Experiment;
use super::keepalive::Binding;
use super::stats::{round_millis, DeliveryReport};

const PADDING_LEN: usize = 500;

/// Which repetition counter digit input currently edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Counter {
    Measured,
    WarmUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Post,
    LongPayload,
}

/// Single-threaded REPL driving the benchmark: reads one command byte at a
/// time, runs request passes across the selected protocols, and owns all
/// bindings, so exchanges never overlap and timings stay clean.
pub struct Dispatcher {
    config: BenchConfig,
    bindings: HashMap<Protocol, Binding>,
    selected: Vec<Protocol>,
    experiment: Experiment,
    request_repetitions: u64,
    warm_up_repetitions: u64,
    editing: Counter,
    padded: bool,
    padding: String,
}

impl Dispatcher {
    pub fn new(config: BenchConfig) -> Self {
        Self {
            config,
            bindings: HashMap::new(),
            selected: vec![Protocol::DtlsPsk, Protocol::Tls],
            experiment: Experiment::new(),
            request_repetitions: 1,
            warm_up_repetitions: 0,
            editing: Counter::Measured,
            padded: false,
            padding: random_alphabetic(PADDING_LEN),
        }
    }

    /// Consumes command bytes until `q` or end of input.
    pub async fn run<R: AsyncRead + Unpin>(&mut self, mut input: R) -> Result<()> {
        let mut byte = [0u8; 1];
        loop {
            let n = input.read(&mut byte).await.context("reading command input")?;
            if n == 0 {
                return Ok(());
            }
            if !self.dispatch(byte[0], &mut input).await? {
                return Ok(());
            }
        }
    }

    /// Handles one command byte. Returns `false` on quit.
    async fn dispatch<R: AsyncRead + Unpin>(&mut self, command: u8, input: &mut R) -> Result<bool> {
        match command {
            b'p' => self.run_pass(PassKind::Post, false).await,
            b'P' => self.run_pass(PassKind::Post, true).await,
            b'g' => self.run_pass(PassKind::LongPayload, false).await,
            b'G' => self.run_pass(PassKind::LongPayload, true).await,
            b'r' => self.reset_all().await,
            b'e' => {
                self.experiment = Experiment::new();
                println!("starting experiment #{}", self.experiment.id());
            }
            b's' => self.show_stats(false).await,
            b'S' => self.show_stats(true).await,
            b'n' => {
                self.request_repetitions = 0;
                self.editing = Counter::Measured;
                println!("enter number of requests");
            }
            b'w' => {
                self.warm_up_repetitions = 0;
                self.editing = Counter::WarmUp;
                println!("enter number of warm-up requests");
            }
            b'0'..=b'9' => self.push_digit(u64::from(command - b'0')),
            b'l' => {
                self.padded = false;
                println!("posting small payloads");
            }
            b'L' => {
                self.padded = true;
                println!("posting padded payloads");
            }
            b'+' => {
                if let Some(protocol) = self.read_protocol(input).await? {
                    self.add_protocol(protocol);
                }
            }
            b'-' => {
                if let Some(protocol) = self.read_protocol(input).await? {
                    self.remove_protocol(protocol);
                }
            }
            b'#' => {
                self.selected.clear();
                println!("cleared protocol selection");
            }
            b'i' => self.show_parameters(),
            b'?' => usage(),
            b'q' => return Ok(false),
            other => debug!(byte = other, "ignoring unrecognized input"),
        }
        Ok(true)
    }

    /// Runs the configured warm-up repetitions, then the measured ones,
    /// both interleaved across the selected protocols.
    async fn run_pass(&mut self, kind: PassKind, with_reset: bool) {
        if self.selected.is_empty() {
            println!("no protocols selected, use +<code> first");
            return;
        }
        let selected = self.selected.clone();
        if self.warm_up_repetitions > 0 {
            println!("warming up ({} per protocol)", self.warm_up_repetitions);
            for _ in 0..self.warm_up_repetitions {
                for protocol in selected.iter().copied() {
                    self.one_call(protocol, kind, with_reset, true).await;
                }
            }
        }
        println!("running {} request(s) per protocol", self.request_repetitions);
        for _ in 0..self.request_repetitions {
            for protocol in selected.iter().copied() {
                self.one_call(protocol, kind, with_reset, false).await;
            }
        }
        println!("finished");
    }

    async fn one_call(&mut self, protocol: Protocol, kind: PassKind, with_reset: bool, warm_up: bool) {
        if with_reset {
            self.binding_mut(protocol).reset().await;
        }
        let experiment_id = self.experiment.id();
        let padding = if self.padded { Some(self.padding.clone()) } else { None };
        match (kind, warm_up) {
            (PassKind::Post, true) => {
                self.binding_mut(protocol)
                    .post(experiment_id, -1, padding.as_deref())
                    .await;
            }
            (PassKind::Post, false) => {
                let request_id = self.experiment.post_stats(protocol).next_request_id();
                let start = Instant::now();
                let outcome = self
                    .binding_mut(protocol)
                    .post(experiment_id, request_id as i64, padding.as_deref())
                    .await;
                let millis = round_millis(start.elapsed());
                self.experiment.post_stats(protocol).record(outcome, millis);
            }
            (PassKind::LongPayload, true) => {
                self.binding_mut(protocol).get_long_payload().await;
            }
            (PassKind::LongPayload, false) => {
                self.experiment.long_payload_stats(protocol).next_request_id();
                let start = Instant::now();
                let outcome = self.binding_mut(protocol).get_long_payload().await;
                let millis = round_millis(start.elapsed());
                self.experiment
                    .long_payload_stats(protocol)
                    .record(outcome, millis);
            }
        }
    }

    async fn reset_all(&mut self) {
        let selected = self.selected.clone();
        for protocol in selected {
            self.binding_mut(protocol).reset().await;
        }
        println!("reset done");
    }

    async fn show_stats(&mut self, reconcile: bool) {
        let selected = self.selected.clone();
        let experiment_id = self.experiment.id();
        for protocol in selected {
            println!("=== {protocol} (experiment #{experiment_id}) ===");
            print!("{}", self.experiment.post_stats(protocol));
            println!("long payload:");
            print!("{}", self.experiment.long_payload_stats(protocol));
            if reconcile {
                let sent = self.experiment.post_stats(protocol).requests;
                let delivered = self.binding_mut(protocol).get(experiment_id).await;
                println!("{}", DeliveryReport::new(delivered, sent));
            }
        }
    }

    fn push_digit(&mut self, digit: u64) {
        let counter = match self.editing {
            Counter::Measured => &mut self.request_repetitions,
            Counter::WarmUp => &mut self.warm_up_repetitions,
        };
        *counter = counter.saturating_mul(10).saturating_add(digit);
    }

    fn add_protocol(&mut self, protocol: Protocol) {
        if self.selected.contains(&protocol) {
            println!("protocol already selected: {protocol}");
        } else {
            self.selected.push(protocol);
            println!("added protocol: {protocol}");
        }
    }

    fn remove_protocol(&mut self, protocol: Protocol) {
        if let Some(position) = self.selected.iter().position(|&p| p == protocol) {
            self.selected.remove(position);
            println!("removed protocol: {protocol}");
        } else {
            println!("protocol was not selected: {protocol}");
        }
    }

    /// Reads a protocol selector: `u`/`U`/`t`/`T`, or `d` followed by the
    /// handshake mode byte.
    async fn read_protocol<R: AsyncRead + Unpin>(&mut self, input: &mut R) -> Result<Option<Protocol>> {
        let Some(code) = read_byte(input).await? else {
            return Ok(None);
        };
        let protocol = match code {
            b'u' => Some(Protocol::Udp),
            b'U' => Some(Protocol::DtlsPsk),
            b't' => Some(Protocol::Tcp),
            b'T' => Some(Protocol::Tls),
            b'd' => {
                let Some(mode) = read_byte(input).await? else {
                    return Ok(None);
                };
                match mode {
                    b'p' => Some(Protocol::DtlsPsk),
                    b'r' => Some(Protocol::DtlsRpk),
                    b'x' => Some(Protocol::DtlsX509),
                    other => {
                        println!("unknown handshake mode '{}', use p, r or x", other as char);
                        None
                    }
                }
            }
            other => {
                println!("unknown protocol code '{}', use u, U, t, T or d<mode>", other as char);
                None
            }
        };
        Ok(protocol)
    }

    fn show_parameters(&self) {
        println!("experiment:      #{}", self.experiment.id());
        let selected: Vec<String> = self.selected.iter().map(|p| p.to_string()).collect();
        println!("protocols:       [{}]", selected.join(", "));
        println!("requests:        {}", self.request_repetitions);
        println!("warm-up:         {}", self.warm_up_repetitions);
        println!("payload:         {}", if self.padded { "padded" } else { "small" });
        println!("server host:     {}", self.config.host);
    }

    fn binding_mut(&mut self, protocol: Protocol) -> &mut Binding {
        self.bindings
            .entry(protocol)
            .or_insert_with(|| Binding::for_protocol(protocol, &self.config))
    }
}

async fn read_byte<R: AsyncRead + Unpin>(input: &mut R) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    let n = input.read(&mut byte).await.context("reading command input")?;
    Ok((n > 0).then_some(byte[0]))
}

/// Prints the command reference.
pub fn usage() {
    println!("commands:");
    println!("  p / P   run posts / run posts with reset before each request");
    println!("  g / G   fetch long payloads / with reset before each fetch");
    println!("  r       reset all selected bindings");
    println!("  e       start a new experiment");
    println!("  s / S   show stats / show stats and reconcile with the server");
    println!("  n / w   edit the request / warm-up counter (then type digits)");
    println!("  l / L   post small / padded payloads");
    println!("  +x / -x add/remove protocol x: u=udp U=dtls+psk t=tcp T=tls");
    println!("          dp=dtls+psk dr=dtls+rpk dx=dtls+x509");
    println!("  #       clear the protocol selection");
    println!("  i       show current parameters");
    println!("  ?       this help");
    println!("  q       quit");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::net::UdpSocket;

    use super::*;
    use crate::client::binding::Outcome;
    use crate::server::{endpoint, Router};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(BenchConfig::default())
    }

    async fn start_udp_endpoint() -> (Arc<Router>, BenchConfig) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let router = Arc::new(Router::new());
        tokio::spawn(endpoint::run_udp(socket, Arc::clone(&router)));
        let mut config = BenchConfig::default();
        config.host = "127.0.0.1".to_string();
        config.ports.udp = port;
        (router, config)
    }

    #[tokio::test]
    async fn digits_accumulate_into_the_selected_counter() {
        let mut d = dispatcher();
        d.run(&b"n25"[..]).await.unwrap();
        assert_eq!(d.request_repetitions, 25);
        assert_eq!(d.warm_up_repetitions, 0);
        d.run(&b"w103"[..]).await.unwrap();
        assert_eq!(d.warm_up_repetitions, 103);
        assert_eq!(d.request_repetitions, 25);
    }

    #[tokio::test]
    async fn selecting_a_counter_zeroes_it() {
        let mut d = dispatcher();
        d.run(&b"n25n3"[..]).await.unwrap();
        assert_eq!(d.request_repetitions, 3);
    }

    #[tokio::test]
    async fn protocols_add_and_remove_in_order() {
        let mut d = dispatcher();
        d.run(&b"#+u+t+T"[..]).await.unwrap();
        assert_eq!(d.selected, vec![Protocol::Udp, Protocol::Tcp, Protocol::Tls]);
        d.run(&b"-t"[..]).await.unwrap();
        assert_eq!(d.selected, vec![Protocol::Udp, Protocol::Tls]);
    }

    #[tokio::test]
    async fn duplicate_selection_is_rejected() {
        let mut d = dispatcher();
        d.run(&b"#+u+u"[..]).await.unwrap();
        assert_eq!(d.selected, vec![Protocol::Udp]);
    }

    #[tokio::test]
    async fn dtls_modes_select_by_second_byte() {
        let mut d = dispatcher();
        d.run(&b"#+dp+dr+dx"[..]).await.unwrap();
        assert_eq!(
            d.selected,
            vec![Protocol::DtlsPsk, Protocol::DtlsRpk, Protocol::DtlsX509]
        );
    }

    #[tokio::test]
    async fn unknown_codes_leave_the_selection_untouched() {
        let mut d = dispatcher();
        d.run(&b"#+z+dq"[..]).await.unwrap();
        assert!(d.selected.is_empty());
    }

    #[tokio::test]
    async fn quit_stops_consuming_input() {
        let mut d = dispatcher();
        d.run(&b"n5q n9"[..]).await.unwrap();
        assert_eq!(d.request_repetitions, 5);
    }

    #[tokio::test]
    async fn unrecognized_bytes_are_ignored() {
        let mut d = dispatcher();
        d.run(&b" \n\tn7 \n"[..]).await.unwrap();
        assert_eq!(d.request_repetitions, 7);
    }

    #[tokio::test]
    async fn new_experiment_gets_a_fresh_id() {
        let mut d = dispatcher();
        let before = d.experiment.id();
        d.run(&b"e"[..]).await.unwrap();
        assert!(d.experiment.id() > before);
    }

    #[tokio::test]
    async fn warm_up_calls_touch_no_stats() {
        let (router, config) = start_udp_endpoint().await;
        let mut d = Dispatcher::new(config);
        d.run(&b"#+uw2n3p"[..]).await.unwrap();
        let experiment_id = d.experiment.id();
        let stats = d.experiment.post_stats(Protocol::Udp);
        // only the three measured posts are counted and timed
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.histogram(Outcome::Success).map(|h| h.len()), Some(3));
        // the two warm-up posts reached the server but were never recorded
        assert_eq!(router.ledger("udp").unwrap().count_for(experiment_id), 3);
    }

    #[tokio::test]
    async fn payload_toggle_flips() {
        let mut d = dispatcher();
        assert!(!d.padded);
        d.run(&b"L"[..]).await.unwrap();
        assert!(d.padded);
        d.run(&b"l"[..]).await.unwrap();
        assert!(!d.padded);
        assert_eq!(d.padding.len(), PADDING_LEN);
    }
}
