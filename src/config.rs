use std::time::Duration;

/// Tunable timing constants for a game session (§3 [EXPANDED]). Defaulted to the values
/// spec.md gives for the main loop, frame clock, and sync engine; overridable so integration
/// tests can run a full round without waiting on real-time sleeps.
#[derive(Debug, Clone, Copy)]
pub struct GameConfig {
    /// How long the main loop sleeps between ticks (§4.6 — 0.5s in the original).
    pub loop_interval: Duration,
    /// Frames a peer may run ahead of the master before it slows down (§4.5 — Δ=2).
    pub frame_delta_threshold: i64,
    /// Fraction of `loop_interval`, per frame of drift, slept to catch up (§4.5 — α=0.1).
    pub catch_up_alpha: f64,
    /// Every Nth tick the master broadcasts `frame_sync` (§4.5 — every 10 ticks).
    pub frame_sync_period: u64,
    /// How long the leader waits for a `sync_ack` before resending `sync_req` (§4.3 — 3s).
    pub sync_req_timeout: Duration,
    /// Fixed retry interval while dialing peers during mesh formation (§4.2 — 1s).
    pub connect_retry_interval: Duration,
    /// Countdown, in whole seconds, announced before a round's seat grab begins (§4.6 — 3s).
    pub round_start_countdown_secs: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            loop_interval: Duration::from_millis(500),
            frame_delta_threshold: 2,
            catch_up_alpha: 0.1,
            frame_sync_period: 10,
            sync_req_timeout: Duration::from_secs(3),
            connect_retry_interval: Duration::from_secs(1),
            round_start_countdown_secs: 3,
        }
    }
}

impl GameConfig {
    /// A config with every sleep/timeout collapsed to near-zero, for tests that drive the FSM
    /// through many ticks without spending wall-clock time.
    pub fn fast_for_tests() -> Self {
        Self {
            loop_interval: Duration::from_millis(1),
            sync_req_timeout: Duration::from_millis(20),
            connect_retry_interval: Duration::from_millis(10),
            round_start_countdown_secs: 0,
            ..Self::default()
        }
    }
}
