use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::ChairsError;
use crate::network::delay_table::DelayTable;
use crate::packet::{Packet, PacketBody};
use crate::player::Player;
use crate::tracker::Tracker;
use crate::wire::{decode_frame, encode_frame, FRAME_LEN};

type ConnectionMap = Arc<Mutex<HashMap<String, TcpStream>>>;
type PacketHistory = Arc<Mutex<HashSet<String>>>;
type PeerAddrMap = Arc<Mutex<HashMap<String, SocketAddr>>>;

struct SendJob {
    packet: Packet,
    peer: String,
    delay_secs: f64,
}

/// Full-mesh TCP transport (§4.2). Every peer dials and accepts from every other peer; the
/// handshake is name-keyed and race-tolerant, so whichever of the two directions completes
/// first wins and the other is dropped. Delivered frames are deduplicated by their stable hash
/// (§4.1) before reaching [`Transport::receive`].
pub struct Transport {
    self_player: Player,
    delay_table: DelayTable,
    connections: ConnectionMap,
    peer_addrs: PeerAddrMap,
    pkt_history: PacketHistory,
    inbound_tx: Sender<Packet>,
    inbound_rx: Mutex<Receiver<Packet>>,
    worker_tx: Sender<SendJob>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    local_addr: SocketAddr,
    connect_retry_interval: Duration,
}

impl Transport {
    /// Binds a listener on `bind_addr` and spawns the accept loop. Call [`Transport::connect_mesh`]
    /// afterwards to dial every other peer named in `tracker`. `connect_retry_interval` is how
    /// long a dial loop sleeps between failed connection attempts (§4.2).
    pub fn bind(
        self_player: Player,
        bind_addr: SocketAddr,
        tracker: &Tracker,
        connect_retry_interval: Duration,
    ) -> Result<Self, ChairsError> {
        let listener = TcpListener::bind(bind_addr)?;
        let local_addr = listener.local_addr()?;

        let peer_names: Vec<String> = tracker
            .players()
            .filter(|&name| name != self_player.name())
            .map(str::to_owned)
            .collect();
        let delay_table = DelayTable::new(peer_names.iter().cloned());

        let connections: ConnectionMap = Arc::new(Mutex::new(HashMap::new()));
        let peer_addrs: PeerAddrMap = Arc::new(Mutex::new(HashMap::new()));
        let pkt_history: PacketHistory = Arc::new(Mutex::new(HashSet::new()));
        let (inbound_tx, inbound_rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));

        let pool_size = peer_names.len().clamp(1, 8);
        let (worker_tx, worker_rx) = mpsc::channel::<SendJob>();
        let worker_rx = Arc::new(Mutex::new(worker_rx));
        let mut handles = Vec::new();
        for _ in 0..pool_size {
            handles.push(spawn_send_worker(Arc::clone(&worker_rx), Arc::clone(&connections)));
        }

        let accept_handle = spawn_accept_loop(
            listener,
            self_player.clone(),
            Arc::clone(&connections),
            Arc::clone(&pkt_history),
            inbound_tx.clone(),
            Arc::clone(&shutdown),
        );
        handles.push(accept_handle);

        Ok(Self {
            self_player,
            delay_table,
            connections,
            peer_addrs,
            pkt_history,
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            worker_tx,
            handles: Mutex::new(handles),
            shutdown,
            local_addr,
            connect_retry_interval,
        })
    }

    /// The address this transport is actually listening on (useful when `bind_addr` used port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Dials every peer in `tracker` other than self, retrying at `connect_retry_interval`
    /// until connected (§4.2 — no overall deadline, matching the original).
    pub fn connect_mesh(&self, tracker: &Tracker) {
        for name in tracker.players() {
            if name == self.self_player.name() {
                continue;
            }
            let Some((ip, port)) = tracker.ip_port(name) else {
                continue;
            };
            let addr = SocketAddr::new(ip, port);
            self.peer_addrs.lock().insert(name.to_owned(), addr);
            let handle = spawn_connector(
                addr,
                name.to_owned(),
                self.self_player.clone(),
                Arc::clone(&self.connections),
                Arc::clone(&self.pkt_history),
                self.inbound_tx.clone(),
                self.connect_retry_interval,
                Arc::clone(&self.shutdown),
            );
            self.handles.lock().push(handle);
        }
    }

    /// True once every name in `expected` has a live connection.
    pub fn all_connected(&self, expected: &[String]) -> bool {
        let connections = self.connections.lock();
        expected
            .iter()
            .filter(|name| name.as_str() != self.self_player.name())
            .all(|name| connections.contains_key(name))
    }

    /// Sends `packet` to one peer, applying that peer's artificial delay table jitter inline.
    pub fn send(&self, packet: &Packet, peer: &str) -> Result<(), ChairsError> {
        let delay = self.delay_table.delay_for(peer);
        if delay > 0.0 {
            thread::sleep(Duration::from_secs_f64(delay));
        }
        self.send_now(packet, peer)
    }

    /// Writes `packet` to `peer`'s pooled connection. On a broken pipe or reset, redials once
    /// (fresh connect + the same `connection_req`/`connection_estab` handshake the initial
    /// mesh formation uses, since our accept loop expects every new socket to open with that
    /// handshake), replaces the pool entry, and retries the write exactly once before giving
    /// up (§4.2 — mirrors the original's `send()` reconnect-and-resend).
    fn send_now(&self, packet: &Packet, peer: &str) -> Result<(), ChairsError> {
        let frame = encode_frame(packet)?;
        {
            let mut connections = self.connections.lock();
            let Some(stream) = connections.get_mut(peer) else {
                return Err(ChairsError::NotConnected { peer: peer.to_string() });
            };
            if stream.write_all(&frame).is_ok() {
                return Ok(());
            }
            connections.remove(peer);
        }

        let mut stream = self.redial(peer)?;
        stream.write_all(&frame)?;
        let write_half = stream.try_clone()?;
        self.connections.lock().insert(peer.to_string(), write_half);

        let peer_name = peer.to_string();
        let pkt_history = Arc::clone(&self.pkt_history);
        let inbound_tx = self.inbound_tx.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let handle = thread::spawn(move || read_loop(peer_name, stream, pkt_history, inbound_tx, shutdown));
        self.handles.lock().push(handle);

        Ok(())
    }

    /// Opens a fresh connection to `peer` and replays the `connection_req`/`connection_estab`
    /// handshake, for use when [`Transport::send_now`] finds the pooled socket dead.
    fn redial(&self, peer: &str) -> Result<TcpStream, ChairsError> {
        let addr = *self
            .peer_addrs
            .lock()
            .get(peer)
            .ok_or_else(|| ChairsError::NotConnected { peer: peer.to_string() })?;

        let mut stream = TcpStream::connect(addr)?;
        let req = Packet::new(PacketBody::ConnectionReq, self.self_player.clone());
        stream.write_all(&encode_frame(&req)?)?;

        let mut reply_frame = [0u8; FRAME_LEN];
        stream.read_exact(&mut reply_frame)?;
        let (_, reply) = decode_frame(&reply_frame)?;
        if !matches!(reply.body, PacketBody::ConnectionEstab) {
            return Err(ChairsError::NotConnected { peer: peer.to_string() });
        }

        Ok(stream)
    }

    /// Broadcasts `packet` to every connected peer. When `wait_times` is given (derived from
    /// [`crate::sync_engine::SyncEngine`]), each peer's send is scheduled on the worker pool
    /// after `delay_table[peer] + wait_times[peer]` seconds so all peers receive it at
    /// approximately the same wall-clock time (§4.3); sends to distinct peers run concurrently,
    /// never serialized behind one another (§9 design note).
    pub fn sendall(&self, packet: Packet, wait_times: Option<&HashMap<String, f64>>) {
        let peers: Vec<String> = self.connections.lock().keys().cloned().collect();
        for peer in peers {
            let extra = wait_times.and_then(|w| w.get(&peer)).copied().unwrap_or(0.0);
            let delay_secs = self.delay_table.delay_for(&peer) + extra;
            let job = SendJob {
                packet: packet.clone(),
                peer,
                delay_secs,
            };
            if self.worker_tx.send(job).is_err() {
                warn!("sendall: worker pool channel closed");
            }
        }
    }

    /// Pops the next deduplicated inbound packet, if any, without blocking.
    pub fn receive(&self) -> Option<Packet> {
        self.inbound_rx.lock().try_recv().ok()
    }

    /// Closes every connection and the listener, and joins all background threads.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.connections.lock().clear();
        // Unblock the accept loop, which is parked in a blocking `accept()` call.
        let _ = TcpStream::connect(self.local_addr);
        for handle in self.handles.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

fn spawn_send_worker(worker_rx: Arc<Mutex<Receiver<SendJob>>>, connections: ConnectionMap) -> JoinHandle<()> {
    thread::spawn(move || loop {
        let job = {
            let rx = worker_rx.lock();
            rx.recv()
        };
        let Ok(job) = job else { return };
        if job.delay_secs > 0.0 {
            thread::sleep(Duration::from_secs_f64(job.delay_secs));
        }
        let Ok(frame) = encode_frame(&job.packet) else { continue };
        let mut conns = connections.lock();
        if let Some(stream) = conns.get_mut(&job.peer) {
            if stream.write_all(&frame).is_err() {
                conns.remove(&job.peer);
            }
        }
    })
}

fn spawn_accept_loop(
    listener: TcpListener,
    self_player: Player,
    connections: ConnectionMap,
    pkt_history: PacketHistory,
    inbound_tx: Sender<Packet>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for incoming in listener.incoming() {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            let Ok(stream) = incoming else { continue };
            let self_player = self_player.clone();
            let connections = Arc::clone(&connections);
            let pkt_history = Arc::clone(&pkt_history);
            let inbound_tx = inbound_tx.clone();
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                if let Some(peer_name) = complete_inbound_handshake(&stream, &self_player) {
                    if let Some(reader_stream) = register_if_absent(&peer_name, &stream, &connections) {
                        read_loop(peer_name, reader_stream, pkt_history, inbound_tx, shutdown);
                    }
                }
            });
        }
    })
}

fn complete_inbound_handshake(mut stream: &TcpStream, self_player: &Player) -> Option<String> {
    let mut frame = [0u8; FRAME_LEN];
    stream.read_exact(&mut frame).ok()?;
    let (_, packet) = decode_frame(&frame).ok()?;
    let PacketBody::ConnectionReq = packet.body else {
        warn!("inbound handshake: expected connection_req, got something else");
        return None;
    };
    let peer_name = packet.sender.name().to_string();
    let reply = Packet::new(PacketBody::ConnectionEstab, self_player.clone());
    let frame = encode_frame(&reply).ok()?;
    stream.write_all(&frame).ok()?;
    Some(peer_name)
}

fn spawn_connector(
    addr: SocketAddr,
    peer_name: String,
    self_player: Player,
    connections: ConnectionMap,
    pkt_history: PacketHistory,
    inbound_tx: Sender<Packet>,
    connect_retry_interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        if shutdown.load(Ordering::SeqCst) || connections.lock().contains_key(&peer_name) {
            return;
        }
        let mut stream = match TcpStream::connect(addr) {
            Ok(stream) => stream,
            Err(_) => {
                thread::sleep(connect_retry_interval);
                continue;
            }
        };

        let req = Packet::new(PacketBody::ConnectionReq, self_player.clone());
        let Ok(frame) = encode_frame(&req) else { return };
        if stream.write_all(&frame).is_err() {
            thread::sleep(connect_retry_interval);
            continue;
        }

        let mut reply_frame = [0u8; FRAME_LEN];
        if stream.read_exact(&mut reply_frame).is_err() {
            thread::sleep(connect_retry_interval);
            continue;
        }
        let Ok((_, reply)) = decode_frame(&reply_frame) else {
            thread::sleep(connect_retry_interval);
            continue;
        };
        if !matches!(reply.body, PacketBody::ConnectionEstab) {
            thread::sleep(connect_retry_interval);
            continue;
        }

        info!(peer = %peer_name, "connected");
        if let Some(reader_stream) = register_if_absent(&peer_name, &stream, &connections) {
            read_loop(peer_name, reader_stream, pkt_history, inbound_tx, shutdown);
        }
        return;
    })
}

fn register_if_absent(peer_name: &str, stream: &TcpStream, connections: &ConnectionMap) -> Option<TcpStream> {
    let mut guard = connections.lock();
    if guard.contains_key(peer_name) {
        debug!(peer = peer_name, "duplicate connection dropped (already connected)");
        return None;
    }
    let write_half = stream.try_clone().ok()?;
    let read_half = stream.try_clone().ok()?;
    guard.insert(peer_name.to_string(), write_half);
    Some(read_half)
}

fn read_loop(
    peer_name: String,
    mut stream: TcpStream,
    pkt_history: PacketHistory,
    inbound_tx: Sender<Packet>,
    shutdown: Arc<AtomicBool>,
) {
    let mut frame = [0u8; FRAME_LEN];
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        match stream.read_exact(&mut frame) {
            Ok(()) => match decode_frame(&frame) {
                Ok((hash, packet)) => {
                    let is_new = pkt_history.lock().insert(hash);
                    if is_new {
                        let _ = inbound_tx.send(packet);
                    }
                }
                Err(e) => warn!(peer = %peer_name, error = %e, "dropping undecodable frame"),
            },
            Err(_) => {
                debug!(peer = %peer_name, "connection closed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod transport_tests {
    use super::*;
    use crate::packet::PacketBody;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Instant;

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
    fn test_two_peers_connect_and_exchange_a_packet() {
        let alice = Player::new("alice");
        let bob = Player::new("bob");

        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let mut tracker = Tracker::new();
        tracker.add(alice.name(), localhost, 0);
        tracker.add(bob.name(), localhost, 0);

        let alice_transport =
            Transport::bind(alice.clone(), SocketAddr::new(localhost, 0), &tracker, Duration::from_millis(10)).unwrap();
        let bob_transport = Transport::bind(bob.clone(), SocketAddr::new(localhost, 0), &tracker, Duration::from_millis(10)).unwrap();

        let mut tracker = Tracker::new();
        tracker.add(alice.name(), localhost, alice_transport.local_addr().port());
        tracker.add(bob.name(), localhost, bob_transport.local_addr().port());

        alice_transport.connect_mesh(&tracker);
        bob_transport.connect_mesh(&tracker);

        let connected = wait_until(
            || {
                alice_transport.all_connected(&[bob.name().to_string()])
                    && bob_transport.all_connected(&[alice.name().to_string()])
            },
            Duration::from_secs(5),
        );
        assert!(connected, "peers did not connect in time");

        let packet = Packet::new(PacketBody::ReadyToStart, alice.clone());
        alice_transport.send(&packet, bob.name()).unwrap();

        let start = Instant::now();
        let mut received = None;
        while start.elapsed() < Duration::from_secs(2) && received.is_none() {
            received = bob_transport.receive();
            if received.is_none() {
                thread::sleep(Duration::from_millis(10));
            }
        }
        assert_eq!(received, Some(packet));

        alice_transport.shutdown();
        bob_transport.shutdown();
    }

    #[test]
    fn test_duplicate_frame_is_deduplicated() {
        let alice = Player::new("alice");
        let bob = Player::new("bob");
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);

        let mut tracker = Tracker::new();
        tracker.add(alice.name(), localhost, 0);
        tracker.add(bob.name(), localhost, 0);

        let alice_transport =
            Transport::bind(alice.clone(), SocketAddr::new(localhost, 0), &tracker, Duration::from_millis(10)).unwrap();
        let bob_transport = Transport::bind(bob.clone(), SocketAddr::new(localhost, 0), &tracker, Duration::from_millis(10)).unwrap();

        let mut tracker = Tracker::new();
        tracker.add(alice.name(), localhost, alice_transport.local_addr().port());
        tracker.add(bob.name(), localhost, bob_transport.local_addr().port());
        alice_transport.connect_mesh(&tracker);
        bob_transport.connect_mesh(&tracker);

        wait_until(
            || alice_transport.all_connected(&[bob.name().to_string()]),
            Duration::from_secs(5),
        );

        let packet = Packet::new(PacketBody::Ack, alice.clone());
        alice_transport.send(&packet, bob.name()).unwrap();
        alice_transport.send(&packet, bob.name()).unwrap();

        wait_until(|| bob_transport.receive().is_some(), Duration::from_secs(2));
        // The second identical frame must be dropped by dedup, not delivered as a second item.
        let second = wait_until(|| bob_transport.receive().is_some(), Duration::from_millis(300));
        assert!(!second, "duplicate frame was delivered twice");

        alice_transport.shutdown();
        bob_transport.shutdown();
    }
}
