use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::ChairsError;
use crate::packet::Packet;

/// Every frame on the wire is exactly this many bytes: `hash_decimal + NUL + json_body`,
/// right-padded with NUL bytes (§4.1). Chosen to match the original's fixed-size `recv(1024)`
/// chunking so a single `read_exact` always yields one complete frame.
pub const FRAME_LEN: usize = 1024;

/// JSON bodies larger than this are dropped before sending rather than silently truncated or
/// split across frames (§4.1).
pub const MAX_BODY_LEN: usize = 1000;

/// Encodes any `hash`-tagged JSON-serializable value into a fixed `FRAME_LEN`-byte frame. Used
/// for in-game [`Packet`]s and, with the lobby's own hash, pre-game lobby messages — both share
/// one wire format (§6 [EXPANDED]).
pub fn encode_frame_tagged(hash: &str, value: &impl Serialize) -> Result<[u8; FRAME_LEN], ChairsError> {
    let body = serde_json::to_vec(value).map_err(|e| ChairsError::BadFrame {
        info: format!("failed to serialize outgoing message: {e}"),
    })?;
    if body.len() > MAX_BODY_LEN {
        warn!(len = body.len(), "dropping oversized outgoing message");
        return Err(ChairsError::OversizedPacket { len: body.len() });
    }

    let mut frame = [0u8; FRAME_LEN];
    let mut cursor = 0;

    let hash_bytes = hash.as_bytes();
    frame[cursor..cursor + hash_bytes.len()].copy_from_slice(hash_bytes);
    cursor += hash_bytes.len();
    frame[cursor] = 0;
    cursor += 1;
    frame[cursor..cursor + body.len()].copy_from_slice(&body);

    Ok(frame)
}

/// Decodes a received `FRAME_LEN`-byte frame into `(hash, value)`.
pub fn decode_frame_tagged<T: DeserializeOwned>(frame: &[u8; FRAME_LEN]) -> Result<(String, T), ChairsError> {
    let trimmed = trim_trailing_nuls(frame);
    let nul_at = trimmed
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ChairsError::BadFrame {
            info: "frame has no NUL separator between hash and body".into(),
        })?;

    let (hash_bytes, rest) = trimmed.split_at(nul_at);
    let body_bytes = &rest[1..];

    let hash = std::str::from_utf8(hash_bytes)
        .map_err(|_| ChairsError::BadFrame {
            info: "hash prefix is not valid UTF-8".into(),
        })?
        .to_string();

    let value: T = serde_json::from_slice(body_bytes).map_err(|e| ChairsError::BadFrame {
        info: format!("failed to parse message body: {e}"),
    })?;

    Ok((hash, value))
}

/// Encodes a [`Packet`], using its own stable hash (§4.1).
pub fn encode_frame(packet: &Packet) -> Result<[u8; FRAME_LEN], ChairsError> {
    encode_frame_tagged(&packet.stable_hash(), packet)
}

/// Decodes a [`Packet`] frame into `(hash, packet)`. The hash is kept alongside the packet so
/// the transport's dedup table never has to recompute or trust a re-derived hash for a frame it
/// did not produce.
pub fn decode_frame(frame: &[u8; FRAME_LEN]) -> Result<(String, Packet), ChairsError> {
    decode_frame_tagged(frame)
}

fn trim_trailing_nuls(frame: &[u8; FRAME_LEN]) -> &[u8] {
    let end = frame.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &frame[..end]
}

#[cfg(test)]
mod wire_tests {
    use super::*;
    use crate::packet::PacketBody;
    use crate::player::Player;

    #[test]
    fn test_round_trip_preserves_packet_and_hash() {
        let packet = Packet::new(PacketBody::ReadyToStart, Player::new("alice"));
        let expected_hash = packet.stable_hash();
        let frame = encode_frame(&packet).expect("fits in a frame");
        let (hash, decoded) = decode_frame(&frame).expect("well-formed frame");
        assert_eq!(hash, expected_hash);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_frame_is_exactly_frame_len_bytes() {
        let packet = Packet::new(PacketBody::Ack, Player::new("bob"));
        let frame = encode_frame(&packet).expect("fits in a frame");
        assert_eq!(frame.len(), FRAME_LEN);
    }

    #[test]
    fn test_oversized_body_is_rejected() {
        let huge_seat = "x".repeat(MAX_BODY_LEN * 2);
        let packet = Packet::new(PacketBody::Action { seat: huge_seat }, Player::new("carol"));
        let err = encode_frame(&packet).unwrap_err();
        assert!(matches!(err, ChairsError::OversizedPacket { .. }));
    }

    #[test]
    fn test_decode_rejects_frame_without_separator() {
        let frame = [b'a'; FRAME_LEN];
        let err = decode_frame(&frame).unwrap_err();
        assert!(matches!(err, ChairsError::BadFrame { .. }));
    }
}
