use std::collections::HashMap;

use crate::packet::PacketBody;
use crate::player::Player;

/// Per-peer logical frame counters with a single dynamic master (§4.5). The master is the
/// clock peers compare themselves against; `FrameClock` itself never performs I/O — it reports
/// what the caller should send (a `frame_sync` broadcast, an `acquire_master` request, a sleep
/// duration) and the caller drives the transport.
#[derive(Debug, Clone)]
pub struct FrameClock {
    self_player: Player,
    master: Option<Player>,
    indiv_clocks: HashMap<String, u64>,
}

impl FrameClock {
    /// `initial_master` is `Some(self)` for the host's own clock at startup and `None`
    /// everywhere else, matching the original's `Clock(..., initial_master=...)` wiring.
    pub fn new(self_player: Player, initial_master: Option<Player>) -> Self {
        Self {
            self_player,
            master: initial_master,
            indiv_clocks: HashMap::new(),
        }
    }

    pub fn master(&self) -> Option<&Player> {
        self.master.as_ref()
    }

    pub fn is_master_myself(&self) -> bool {
        self.master.as_ref() == Some(&self.self_player)
    }

    /// Records the latest frame count reported by `player`.
    pub fn update_frame(&mut self, player_name: impl Into<String>, frame: u64) {
        self.indiv_clocks.insert(player_name.into(), frame);
    }

    pub fn frame_of(&self, player_name: &str) -> Option<u64> {
        self.indiv_clocks.get(player_name).copied()
    }

    /// If this peer is currently master, returns the `update_master` broadcast handing the role
    /// to `new_master` (§4.5 `if_master_emit_new_master`).
    pub fn emit_new_master_if_master(&self, new_master: &Player) -> Option<PacketBody> {
        self.is_master_myself().then(|| PacketBody::UpdateMaster {
            new_master: new_master.name().to_string(),
        })
    }

    /// Applies an incoming `update_master` announcement. Accepted when there is no master yet
    /// (the bootstrap/race window) or when it comes from the current master — kept as specified
    /// rather than tightened, see the design notes on this rule.
    pub fn update_master(&mut self, new_master: Player, from: &Player) {
        let accept = match &self.master {
            None => true,
            Some(current) => current == from,
        };
        if accept {
            self.master = Some(new_master);
        }
    }

    /// Returns the `acquire_master` request this peer should send to the current master, when
    /// there is one, to ask to take over the role (§4.5).
    pub fn acquire_master_request(&self) -> Option<PacketBody> {
        self.master.as_ref().map(|_| PacketBody::AcquireMaster)
    }

    /// Accepts a request from `requester` to take over as master. Returns the `update_master`
    /// broadcast this peer must send (if it was master) before installing the new master
    /// locally, mirroring the original's `if_master_emit_new_master` followed by
    /// `update_master` on `acquire_master` receipt.
    pub fn grant_master(&mut self, requester: Player) -> Option<PacketBody> {
        let announcement = self.emit_new_master_if_master(&requester);
        let from = self.self_player.clone();
        self.update_master(requester, &from);
        announcement
    }

    /// Given an incoming `frame_sync` broadcast from the master reporting `master_frame`,
    /// decides what this peer should do: sleep to slow down (duration in seconds), request to
    /// become master because it is behind, or do nothing (§4.5). `frame_delta_threshold` and
    /// `catch_up_alpha` come from [`crate::config::GameConfig`].
    pub fn reconcile(
        &self,
        sender: &Player,
        master_frame: u64,
        self_frame: u64,
        loop_interval_secs: f64,
        frame_delta_threshold: i64,
        catch_up_alpha: f64,
    ) -> FrameSyncAction {
        let Some(master) = &self.master else {
            return FrameSyncAction::None;
        };
        if master != sender {
            return FrameSyncAction::None;
        }
        let ahead_by = self_frame as i64 - master_frame as i64;
        if ahead_by > frame_delta_threshold {
            FrameSyncAction::SlowDown(loop_interval_secs * ahead_by as f64 * catch_up_alpha)
        } else if master_frame > self_frame {
            FrameSyncAction::RequestMaster
        } else {
            FrameSyncAction::None
        }
    }
}

/// What a peer should do after comparing its own frame count to the master's (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSyncAction {
    None,
    /// Sleep this many seconds to let the master catch up.
    SlowDown(f64),
    /// Ask the master to hand over the role, because this peer is behind.
    RequestMaster,
}

#[cfg(test)]
mod frame_clock_tests {
    use super::*;

    fn players() -> (Player, Player) {
        (Player::new("alice"), Player::new("bob"))
    }

    #[test]
    fn test_host_starts_as_its_own_master() {
        let (alice, _) = players();
        let clock = FrameClock::new(alice.clone(), Some(alice));
        assert!(clock.is_master_myself());
    }

    #[test]
    fn test_update_master_accepted_when_none() {
        let (alice, bob) = players();
        let mut clock = FrameClock::new(alice.clone(), None);
        clock.update_master(bob.clone(), &alice);
        assert_eq!(clock.master(), Some(&bob));
    }

    #[test]
    fn test_update_master_rejected_from_non_master_once_set() {
        let (alice, bob) = players();
        let carol = Player::new("carol");
        let mut clock = FrameClock::new(alice.clone(), Some(bob.clone()));
        clock.update_master(carol, &alice);
        assert_eq!(clock.master(), Some(&bob));
    }

    #[test]
    fn test_reconcile_slows_down_when_far_ahead() {
        let (alice, bob) = players();
        let mut clock = FrameClock::new(alice, Some(bob.clone()));
        clock.update_frame(bob.name(), 10);
        let action = clock.reconcile(&bob, 10, 15, 0.5, 2, 0.1);
        assert_eq!(action, FrameSyncAction::SlowDown(0.5 * 5.0 * 0.1));
    }

    #[test]
    fn test_reconcile_requests_master_when_behind() {
        let (alice, bob) = players();
        let clock = FrameClock::new(alice, Some(bob.clone()));
        let action = clock.reconcile(&bob, 10, 3, 0.5, 2, 0.1);
        assert_eq!(action, FrameSyncAction::RequestMaster);
    }

    #[test]
    fn test_reconcile_ignores_non_master_sender() {
        let (alice, bob) = players();
        let carol = Player::new("carol");
        let clock = FrameClock::new(alice, Some(bob));
        let action = clock.reconcile(&carol, 999, 0, 0.5, 2, 0.1);
        assert_eq!(action, FrameSyncAction::None);
    }

    #[test]
    fn test_reconcile_respects_custom_threshold() {
        let (alice, bob) = players();
        let mut clock = FrameClock::new(alice, Some(bob.clone()));
        clock.update_frame(bob.name(), 10);
        // ahead by 1 frame, but threshold is 0 so it should still slow down.
        let action = clock.reconcile(&bob, 10, 11, 0.5, 0, 0.1);
        assert_eq!(action, FrameSyncAction::SlowDown(0.5 * 1.0 * 0.1));
    }
}
