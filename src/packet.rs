use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::player::Player;

/// The payload carried by a [`Packet`]. Each variant corresponds to one wire `packet_type`
/// from the protocol (§3, §4.1). Collapsing every message into one tagged enum lets
/// [`crate::network::transport::Transport`] and [`crate::fsm::game::GameFsm`] dispatch with a
/// single exhaustive match instead of dynamic typing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PacketBody {
    ConnectionReq,
    ConnectionEstab,
    PeeringCompleted,
    SyncReq { round: u32 },
    SyncAck { round: u32, delay_secs: f64 },
    PeerSyncAck { round: u32, delay_secs: f64 },
    UpdateLeader { round: u32 },
    ReadyToStart,
    AckStart,
    Action { seat: String },
    Ack,
    Nak,
    SatDown { seat: String },
    Vote { candidate: String },
    FrameSync { frame: u64 },
    AcquireMaster,
    UpdateMaster { new_master: String },
    EndGame,
}

impl PacketBody {
    /// The wire `packet_type` string (§3), used for logging and the lobby protocol.
    pub fn type_name(&self) -> &'static str {
        match self {
            PacketBody::ConnectionReq => "connection_req",
            PacketBody::ConnectionEstab => "connection_estab",
            PacketBody::PeeringCompleted => "peering_completed",
            PacketBody::SyncReq { .. } => "sync_req",
            PacketBody::SyncAck { .. } => "sync_ack",
            PacketBody::PeerSyncAck { .. } => "peer_sync_ack",
            PacketBody::UpdateLeader { .. } => "update_leader",
            PacketBody::ReadyToStart => "ready_to_start",
            PacketBody::AckStart => "ack_start",
            PacketBody::Action { .. } => "action",
            PacketBody::Ack => "ack",
            PacketBody::Nak => "nak",
            PacketBody::SatDown { .. } => "sat_down",
            PacketBody::Vote { .. } => "vote",
            PacketBody::FrameSync { .. } => "frame_sync",
            PacketBody::AcquireMaster => "acquire_master",
            PacketBody::UpdateMaster { .. } => "update_master",
            PacketBody::EndGame => "end_game",
        }
    }

    /// Whether this packet type is unique per send (its hash folds in `created_at`, so two
    /// sends with identical data at different times are both delivered) versus unique per
    /// logical occurrence (its hash ignores `created_at`, so the literal retransmission the
    /// timer in §4.2/§4.3 performs collides with the original and is dropped by dedup).
    fn unique_per_send(&self) -> bool {
        matches!(
            self,
            PacketBody::Action { .. }
                | PacketBody::SatDown { .. }
                | PacketBody::Vote { .. }
                | PacketBody::FrameSync { .. }
                | PacketBody::AcquireMaster
                | PacketBody::UpdateMaster { .. }
                | PacketBody::Ack
                | PacketBody::Nak
                | PacketBody::PeeringCompleted
        )
    }
}

/// Tagged envelope wrapping every message exchanged between peers (§3). `created_at` is a
/// Unix timestamp in fractional seconds, used both for the wire-level dedup hash and for the
/// seat-selection tie-break (§4.6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub body: PacketBody,
    pub sender: Player,
    pub created_at: f64,
}

impl Packet {
    /// Builds a packet stamped with the current time.
    pub fn new(body: PacketBody, sender: Player) -> Self {
        Self {
            body,
            sender,
            created_at: unix_time_secs(),
        }
    }

    /// Computes the stable dedup hash described in §4.1: sends that represent the same
    /// logical occurrence collide, sends that carry new information do not. Rendered as an
    /// unsigned decimal string to match the wire format `hash_decimal + NUL + json_body`.
    pub fn stable_hash(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.body.type_name().hash(&mut hasher);
        self.sender.name().hash(&mut hasher);
        hash_body_data(&self.body, &mut hasher);
        if self.body.unique_per_send() {
            self.created_at.to_bits().hash(&mut hasher);
        }
        hasher.finish().to_string()
    }
}

fn hash_body_data(body: &PacketBody, hasher: &mut DefaultHasher) {
    match body {
        PacketBody::SyncReq { round } => round.hash(hasher),
        PacketBody::SyncAck { round, delay_secs } | PacketBody::PeerSyncAck { round, delay_secs } => {
            round.hash(hasher);
            delay_secs.to_bits().hash(hasher);
        }
        PacketBody::UpdateLeader { round } => round.hash(hasher),
        PacketBody::Action { seat } | PacketBody::SatDown { seat } => seat.hash(hasher),
        PacketBody::Vote { candidate } => candidate.hash(hasher),
        PacketBody::FrameSync { frame } => frame.hash(hasher),
        PacketBody::UpdateMaster { new_master } => new_master.hash(hasher),
        PacketBody::ConnectionReq
        | PacketBody::ConnectionEstab
        | PacketBody::PeeringCompleted
        | PacketBody::ReadyToStart
        | PacketBody::AckStart
        | PacketBody::Ack
        | PacketBody::Nak
        | PacketBody::AcquireMaster
        | PacketBody::EndGame => {}
    }
}

pub(crate) fn unix_time_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs_f64()
}
