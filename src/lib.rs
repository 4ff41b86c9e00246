//! # lastchair
//! A fully peer-to-peer musical-chairs elimination game. Every player connects to every
//! other player directly over TCP; there is no authoritative server. A rotating-leader delay
//! probe keeps broadcasts arriving at roughly the same wall-clock moment across peers, a
//! single dynamic-master logical frame clock keeps everyone's loop cadence aligned, and a
//! per-round finite state machine drives the seat-grab-and-vote elimination game itself.

#![forbid(unsafe_code)]

pub use cli::{Cli, LaunchMode};
pub use config::GameConfig;
pub use error::ChairsError;
pub use frame_clock::FrameClock;
pub use fsm::{FsmState, GameFsm};
pub use network::{DelayTable, Transport};
pub use packet::{Packet, PacketBody};
pub use player::Player;
pub use sync_engine::SyncEngine;
pub use tracker::Tracker;

pub mod cli;
pub mod config;
pub mod error;
pub mod frame_clock;
pub mod fsm;
pub mod hotkeys;
pub mod lobby;
pub mod logging;
pub mod namegen;
pub mod network;
pub mod packet;
pub mod player;
pub mod sync_engine;
pub mod tracker;
pub mod wire;
