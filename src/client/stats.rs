use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use hdrhistogram::Histogram;

use super::binding::Outcome;

const LOWEST_MILLIS: u64 = 1;
const HIGHEST_MILLIS: u64 = 60_000_000;
const SIGFIG: u8 = 3;

/// Per-protocol measurement state: how many requests were attempted and,
/// keyed by outcome, the observed millisecond durations.
pub struct Stats {
    pub requests: u64,
    durations: HashMap<Outcome, Histogram<u64>>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            requests: 0,
            durations: HashMap::new(),
        }
    }

    /// Assigns the next request sequence number (the value before the
    /// counter advances).
    pub fn next_request_id(&mut self) -> u64 {
        let id = self.requests;
        self.requests += 1;
        id
    }

    pub fn record(&mut self, outcome: Outcome, millis: u64) {
        let histogram = self.durations.entry(outcome).or_insert_with(|| {
            Histogram::new_with_bounds(LOWEST_MILLIS, HIGHEST_MILLIS, SIGFIG).unwrap()
        });
        // the histogram cannot record 0, and a sub-millisecond round trip
        // is a 1 ms bucket anyway
        let _ = histogram.record(millis.max(1));
    }

    pub fn histogram(&self, outcome: Outcome) -> Option<&Histogram<u64>> {
        self.durations.get(&outcome)
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "requests: {}", self.requests)?;
        for (outcome, h) in &self.durations {
            writeln!(
                f,
                "{outcome} - count: {}; min: {} ms; max: {} ms; mean: {:.2} ms; stddev: {:.2}",
                h.len(),
                h.min(),
                h.max(),
                h.mean(),
                h.stdev(),
            )?;
            writeln!(
                f,
                "  p25: {}; p50: {}; p75: {}; p90: {}; p95: {}; p98: {}",
                h.value_at_quantile(0.25),
                h.value_at_quantile(0.50),
                h.value_at_quantile(0.75),
                h.value_at_quantile(0.90),
                h.value_at_quantile(0.95),
                h.value_at_quantile(0.98),
            )?;
        }
        Ok(())
    }
}

/// Rounds an elapsed duration half-up to whole milliseconds.
pub fn round_millis(elapsed: Duration) -> u64 {
    (elapsed.as_nanos() as u64 + 500_000) / 1_000_000
}

/// Server-confirmed deliveries against locally attempted posts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeliveryReport {
    /// No count could be fetched from the server.
    Unknown,
    /// Nothing was sent, so a ratio would be meaningless.
    NothingSent { delivered: u64 },
    Ratio { delivered: u64, sent: u64 },
}

impl DeliveryReport {
    pub fn new(delivered: Option<u64>, sent: u64) -> Self {
        match delivered {
            None => DeliveryReport::Unknown,
            Some(delivered) if sent == 0 => DeliveryReport::NothingSent { delivered },
            Some(delivered) => DeliveryReport::Ratio { delivered, sent },
        }
    }

    pub fn ratio(&self) -> Option<f64> {
        match self {
            DeliveryReport::Ratio { delivered, sent } => Some(*delivered as f64 / *sent as f64),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryReport::Unknown => write!(f, "count on server: unknown"),
            DeliveryReport::NothingSent { delivered } => {
                write!(f, "count on server: {delivered}; no requests sent")
            }
            DeliveryReport::Ratio { delivered, sent } => write!(
                f,
                "count on server: {delivered}; sent: {sent}; delivered: {:.3}",
                *delivered as f64 / *sent as f64
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_advances_independently_of_recordings() {
        let mut stats = Stats::new();
        assert_eq!(stats.next_request_id(), 0);
        assert_eq!(stats.next_request_id(), 1);
        assert_eq!(stats.requests, 2);
        assert!(stats.histogram(Outcome::Success).is_none());
    }

    #[test]
    fn durations_bucket_by_outcome() {
        let mut stats = Stats::new();
        stats.record(Outcome::Success, 12);
        stats.record(Outcome::Success, 14);
        stats.record(Outcome::NoResponse, 10_000);
        let success = stats.histogram(Outcome::Success).unwrap();
        assert_eq!(success.len(), 2);
        assert_eq!(success.min(), 12);
        let lost = stats.histogram(Outcome::NoResponse).unwrap();
        assert_eq!(lost.len(), 1);
        assert!(stats.histogram(Outcome::Failure).is_none());
    }

    #[test]
    fn zero_duration_is_clamped_not_dropped() {
        let mut stats = Stats::new();
        stats.record(Outcome::Success, 0);
        assert_eq!(stats.histogram(Outcome::Success).unwrap().len(), 1);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_millis(Duration::from_nanos(499_999)), 0);
        assert_eq!(round_millis(Duration::from_nanos(500_000)), 1);
        assert_eq!(round_millis(Duration::from_millis(12)), 12);
        assert_eq!(round_millis(Duration::from_micros(12_500)), 13);
    }

    #[test]
    fn delivery_report_handles_zero_sent() {
        assert_eq!(DeliveryReport::new(None, 5), DeliveryReport::Unknown);
        let report = DeliveryReport::new(Some(2), 0);
        assert_eq!(report, DeliveryReport::NothingSent { delivered: 2 });
        assert_eq!(report.ratio(), None);
        let report = DeliveryReport::new(Some(3), 4);
        assert_eq!(report.ratio(), Some(0.75));
    }

    #[test]
    fn empty_stats_display_without_panicking() {
        assert_eq!(Stats::new().to_string(), "requests: 0\n");
    }
}
