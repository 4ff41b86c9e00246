//! Exercises full-mesh formation and broadcast delivery across three real loopback sockets,
//! one level below the FSM (§4.2, §4.3).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::{Duration, Instant};

use lastchair::{Packet, PacketBody, Player, Tracker, Transport};

fn localhost() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn test_three_peers_form_a_full_mesh_and_broadcast_reaches_everyone() {
    let players = [Player::new("alice"), Player::new("bob"), Player::new("carol")];

    let mut lobby_tracker = Tracker::new();
    for player in &players {
        lobby_tracker.add(player.name(), localhost(), 0);
    }

    let transports: Vec<Transport> = players
        .iter()
        .map(|player| {
            Transport::bind(
                player.clone(),
                SocketAddr::new(localhost(), 0),
                &lobby_tracker,
                Duration::from_millis(10),
            )
            .expect("bind loopback")
        })
        .collect();

    let mut tracker = Tracker::new();
    for (player, transport) in players.iter().zip(&transports) {
        tracker.add(player.name(), localhost(), transport.local_addr().port());
    }

    for transport in &transports {
        transport.connect_mesh(&tracker);
    }

    let all_names: Vec<String> = players.iter().map(|p| p.name().to_string()).collect();
    let formed = wait_until(
        || transports.iter().all(|t| t.all_connected(&all_names)),
        Duration::from_secs(10),
    );
    assert!(formed, "full mesh did not form across three peers in time");

    let broadcast = Packet::new(PacketBody::PeeringCompleted, players[0].clone());
    transports[0].sendall(broadcast.clone(), None);

    for (i, transport) in transports.iter().enumerate().skip(1) {
        let received = wait_until(
            || matches!(transport.receive(), Some(ref p) if p.stable_hash() == broadcast.stable_hash()),
            Duration::from_secs(2),
        );
        assert!(received, "peer {i} never received the broadcast");
    }

    for transport in &transports {
        transport.shutdown();
    }
}
