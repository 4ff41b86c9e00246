use std::collections::HashMap;

use rand::Rng;

/// Per-peer artificial send delay (§4.4). Each entry is drawn once, uniformly from
/// `{0.01, 0.02, ..., 0.09}` seconds, when the table is built, and stays fixed for the
/// process's lifetime — it models each peer's simulated link jitter, not a live measurement.
#[derive(Debug, Clone, Default)]
pub struct DelayTable {
    delays: HashMap<String, f64>,
}

const CANDIDATES: [f64; 9] = [0.01, 0.02, 0.03, 0.04, 0.05, 0.06, 0.07, 0.08, 0.09];

impl DelayTable {
    /// Draws one delay per name in `peers`.
    pub fn new(peers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut rng = rand::thread_rng();
        let delays = peers
            .into_iter()
            .map(|name| {
                let idx = rng.gen_range(0..CANDIDATES.len());
                (name.into(), CANDIDATES[idx])
            })
            .collect();
        Self { delays }
    }

    /// The artificial delay to apply before sending to `peer`, in seconds. Zero for an unknown
    /// peer (e.g. one that joined after the table was built, which should not happen post-lobby
    /// but is handled gracefully rather than panicking).
    pub fn delay_for(&self, peer: &str) -> f64 {
        self.delays.get(peer).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod delay_table_tests {
    use super::*;

    #[test]
    fn test_every_peer_gets_a_delay_from_the_candidate_set() {
        let table = DelayTable::new(["alice", "bob", "carol"]);
        for name in ["alice", "bob", "carol"] {
            let d = table.delay_for(name);
            assert!(CANDIDATES.contains(&d), "{d} not in candidate set");
        }
    }

    #[test]
    fn test_unknown_peer_has_zero_delay() {
        let table = DelayTable::new(["alice"]);
        assert_eq!(table.delay_for("stranger"), 0.0);
    }

    #[test]
    fn test_delay_is_stable_across_repeated_lookups() {
        let table = DelayTable::new(["alice"]);
        let first = table.delay_for("alice");
        let second = table.delay_for("alice");
        assert_eq!(first, second);
    }
}
