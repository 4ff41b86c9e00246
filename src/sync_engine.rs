use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Rotating-leader pairwise delay probe (§4.3). Exactly one player in `leader_list` is the
/// active leader at a time; the leader probes every other peer's one-way delay, derives a
/// wait-time per peer so a later broadcast lands at approximately the same moment everywhere,
/// then hands the leader role to the next player in rotation.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    self_name: String,
    leader_list: Vec<String>,
    leader_idx: usize,
    delay_dict: HashMap<String, f64>,
    sync_req_sent_at: HashMap<String, Instant>,
    req_timeout: Duration,
}

impl SyncEngine {
    /// `leader_list` is the frozen rotation order shared by every peer (§3, §4.3). `req_timeout`
    /// is how long the leader waits for a `sync_ack` from a given peer before resending its
    /// `sync_req` (§4.3). The original drives this off a per-peer `threading.Timer`; this crate
    /// polls elapsed time against that same bound from the game loop tick instead of spawning a
    /// timer thread per peer.
    pub fn new(self_name: impl Into<String>, leader_list: Vec<String>, req_timeout: Duration) -> Self {
        Self {
            self_name: self_name.into(),
            leader_list,
            leader_idx: 0,
            delay_dict: HashMap::new(),
            sync_req_sent_at: HashMap::new(),
            req_timeout,
        }
    }

    /// The frozen rotation order every peer shares (§3, §4.3).
    pub fn leader_list(&self) -> &[String] {
        &self.leader_list
    }

    /// The name of the currently active leader.
    pub fn current_leader(&self) -> &str {
        &self.leader_list[self.leader_idx]
    }

    /// True when this peer is the currently active leader.
    pub fn is_leader_myself(&self) -> bool {
        self.current_leader() == self.self_name
    }

    /// Advances to the next leader in rotation. A no-op once the rotation has reached its
    /// last entry — callers check [`SyncEngine::no_more_leader`] to detect that.
    pub fn next_leader(&mut self) {
        if self.leader_idx < self.leader_list.len() - 1 {
            self.leader_idx += 1;
        }
    }

    /// True once every peer in `leader_list` has had a turn as leader.
    pub fn no_more_leader(&self) -> bool {
        self.leader_idx == self.leader_list.len() - 1
    }

    /// Records (or overwrites) the measured delay from `peer`. A later report for the same
    /// peer within the same round overwrites the earlier one — last value wins, so a `sync_ack`
    /// that arrives after its `sync_req` was already retransmitted is still accepted.
    pub fn record_delay(&mut self, peer: impl Into<String>, delay_secs: f64) {
        let peer = peer.into();
        self.sync_req_sent_at.remove(&peer);
        self.delay_dict.insert(peer, delay_secs);
    }

    /// True once a delay has been recorded from every other peer in the rotation.
    pub fn done(&self) -> bool {
        self.delay_dict.len() == self.leader_list.len() - 1
    }

    /// Delays sorted slowest-first, the form the wait-time derivation and diagnostics need.
    pub fn ordered_delays(&self) -> Vec<(String, f64)> {
        let mut entries: Vec<(String, f64)> = self
            .delay_dict
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        entries
    }

    /// Derives the per-peer wait time so a synchronized broadcast lands everywhere at
    /// approximately the same wall-clock moment: the slowest peer waits zero, everyone else
    /// waits `slowest_delay - their_delay` (§4.3). `None` until every peer has reported.
    pub fn wait_times(&self) -> Option<HashMap<String, f64>> {
        let ordered = self.ordered_delays();
        if ordered.len() != self.leader_list.len() - 1 {
            return None;
        }
        let mut wait_times = HashMap::new();
        let (slowest_name, slowest_delay) = ordered[0].clone();
        wait_times.insert(slowest_name, 0.0);
        for (name, delay) in &ordered[1..] {
            wait_times.insert(name.clone(), slowest_delay - delay);
        }
        Some(wait_times)
    }

    /// Clears accumulated delay data and rewinds the rotation to its first leader, for the
    /// start of a fresh round (§4.6 RESET_SYNC).
    pub fn reset(&mut self) {
        self.delay_dict.clear();
        self.sync_req_sent_at.clear();
        self.leader_idx = 0;
    }

    /// Marks that a `sync_req` was just (re)sent to `peer`, starting its timeout window.
    pub fn mark_sync_req_sent(&mut self, peer: impl Into<String>) {
        self.sync_req_sent_at.insert(peer.into(), Instant::now());
    }

    /// Peers the leader sent a `sync_req` to more than `req_timeout` ago with no reply yet, and
    /// so should be resent to.
    pub fn peers_needing_resend(&self) -> Vec<String> {
        self.sync_req_sent_at
            .iter()
            .filter(|(peer, sent_at)| {
                !self.delay_dict.contains_key(*peer) && sent_at.elapsed() >= self.req_timeout
            })
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    /// Peers still awaiting an initial `sync_req` this round (neither sent-and-pending nor
    /// already replied).
    pub fn peers_awaiting_initial_req(&self) -> Vec<String> {
        self.leader_list
            .iter()
            .filter(|&p| {
                p != &self.self_name
                    && !self.delay_dict.contains_key(p)
                    && !self.sync_req_sent_at.contains_key(p)
            })
            .cloned()
            .collect()
    }
}
