use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::protocol::Protocol;

use super::stats::Stats;

static NEXT_EXPERIMENT_ID: AtomicU64 = AtomicU64::new(0);

/// One benchmark run: a process-unique id plus lazily created per-protocol
/// stats, with long-payload fetches tracked separately from posts.
pub struct Experiment {
    id: u64,
    post_stats: HashMap<Protocol, Stats>,
    long_payload_stats: HashMap<Protocol, Stats>,
}

impl Experiment {
    pub fn new() -> Self {
        Self {
            id: NEXT_EXPERIMENT_ID.fetch_add(1, Ordering::SeqCst),
            post_stats: HashMap::new(),
            long_payload_stats: HashMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn post_stats(&mut self, protocol: Protocol) -> &mut Stats {
        self.post_stats.entry(protocol).or_default()
    }

    pub fn long_payload_stats(&mut self, protocol: Protocol) -> &mut Stats {
        self.long_payload_stats.entry(protocol).or_default()
    }
}

impl Default for Experiment {
    fn default() -> Self {
        Self::new()
    }
}
