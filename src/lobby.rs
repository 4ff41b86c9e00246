use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ChairsError;
use crate::tracker::Tracker;
use crate::wire::{decode_frame_tagged, encode_frame_tagged, FRAME_LEN};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Pre-game registrar messages (§6 [EXPANDED]). Thin by design — the lobby's only job is to
/// collect `(name, addr)` pairs into a [`Tracker`] and hand every connected player the same
/// frozen copy once the host starts the game.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum LobbyMessage {
    Register { name: String, ip: IpAddr, port: u16 },
    Start { tracker: Tracker },
    Shutdown,
}

impl LobbyMessage {
    fn stable_hash(&self) -> String {
        let mut hasher = DefaultHasher::new();
        match self {
            LobbyMessage::Register { name, ip, port } => {
                "register".hash(&mut hasher);
                name.hash(&mut hasher);
                ip.hash(&mut hasher);
                port.hash(&mut hasher);
            }
            LobbyMessage::Start { .. } => "start".hash(&mut hasher),
            LobbyMessage::Shutdown => "shutdown".hash(&mut hasher),
        }
        hasher.finish().to_string()
    }
}

fn send_message(stream: &mut TcpStream, message: &LobbyMessage) -> Result<(), ChairsError> {
    let frame = encode_frame_tagged(&message.stable_hash(), message)?;
    stream.write_all(&frame)?;
    Ok(())
}

fn recv_message(stream: &mut TcpStream) -> Result<LobbyMessage, ChairsError> {
    let mut frame = [0u8; FRAME_LEN];
    stream.read_exact(&mut frame)?;
    let (_, message) = decode_frame_tagged(&frame)?;
    Ok(message)
}

/// Hosts a lobby on `bind_addr`, registering `host_name` as the first entry, and blocks until a
/// `y` + Enter on stdin signals the start with at least 2 registered players (standing in for
/// the original's space-bar hotkey, §6 [EXPANDED]). Returns the frozen tracker after
/// broadcasting it to every registered player.
pub fn host(bind_addr: SocketAddr, host_name: &str) -> Result<Tracker, ChairsError> {
    let listener = TcpListener::bind(bind_addr)?;
    listener.set_nonblocking(true)?;

    let mut tracker = Tracker::new();
    tracker.add(host_name, bind_addr.ip(), bind_addr.port());

    let mut connections: Vec<TcpStream> = Vec::new();
    let (start_tx, start_rx) = mpsc::channel();
    spawn_start_watcher(start_tx);

    loop {
        match listener.accept() {
            Ok((mut stream, _)) => {
                if let Ok(LobbyMessage::Register { name, ip, port }) = recv_message(&mut stream) {
                    info!(player = %name, "registered");
                    tracker.add(name, ip, port);
                    connections.push(stream);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(ChairsError::Io(e)),
        }

        if start_rx.try_recv().is_ok() && tracker.player_count() >= 2 {
            break;
        }
        thread::sleep(ACCEPT_POLL_INTERVAL);
    }

    let start = LobbyMessage::Start { tracker: tracker.clone() };
    for mut stream in connections {
        let _ = send_message(&mut stream, &start);
    }

    Ok(tracker)
}

fn spawn_start_watcher(tx: Sender<()>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { return };
            if line.trim().eq_ignore_ascii_case("y") {
                let _ = tx.send(());
                return;
            }
        }
    });
}

/// Dials a lobby host, registers `player_name`, and blocks until the host broadcasts the start
/// signal with the frozen tracker, or shuts down.
pub fn join(
    host_addr: SocketAddr,
    player_addr: SocketAddr,
    player_name: &str,
) -> Result<Tracker, ChairsError> {
    let mut stream = TcpStream::connect(host_addr)?;
    send_message(
        &mut stream,
        &LobbyMessage::Register {
            name: player_name.to_string(),
            ip: player_addr.ip(),
            port: player_addr.port(),
        },
    )?;

    loop {
        match recv_message(&mut stream)? {
            LobbyMessage::Start { tracker } => return Ok(tracker),
            LobbyMessage::Shutdown => {
                return Err(ChairsError::NotConnected {
                    peer: "lobby host".to_string(),
                })
            }
            LobbyMessage::Register { .. } => continue,
        }
    }
}

#[cfg(test)]
mod lobby_tests {
    use super::*;

    #[test]
    fn test_lobby_message_round_trips_through_wire_frame() {
        let msg = LobbyMessage::Register {
            name: "alice".into(),
            ip: IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            port: 9000,
        };
        let frame = encode_frame_tagged(&msg.stable_hash(), &msg).unwrap();
        let (hash, decoded): (String, LobbyMessage) = decode_frame_tagged(&frame).unwrap();
        assert_eq!(hash, msg.stable_hash());
        match decoded {
            LobbyMessage::Register { name, port, .. } => {
                assert_eq!(name, "alice");
                assert_eq!(port, 9000);
            }
            _ => panic!("wrong variant"),
        }
    }
}
