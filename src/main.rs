use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use tracing::{error, info};

use lastchair::cli::{Cli, LaunchMode};
use lastchair::config::GameConfig;
use lastchair::fsm::GameFsm;
use lastchair::network::Transport;
use lastchair::player::Player;
use lastchair::{lobby, logging};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let launch_mode = match cli.into_launch_mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let timestamp = hh_mm_ss_now();
    let (role, name) = match &launch_mode {
        LaunchMode::Host { name, .. } => ("HOST", name.clone()),
        LaunchMode::Player { name, .. } => ("PLAYER", name.clone()),
    };
    if let Err(e) = logging::init(role, &name, &timestamp) {
        eprintln!("failed to set up logging: {e}");
        return ExitCode::FAILURE;
    }
    info!(role, name = %name, "starting lastchair");

    match run(launch_mode, &name) {
        Ok(()) => {
            info!("game ended normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "game failed to start or run");
            ExitCode::FAILURE
        }
    }
}

fn run(launch_mode: LaunchMode, name: &str) -> Result<(), lastchair::ChairsError> {
    let (tracker, bind_addr, is_host) = match launch_mode {
        LaunchMode::Host { host_ip, host_port, .. } => {
            let bind_addr: SocketAddr = format!("{host_ip}:{host_port}").parse().map_err(|_| {
                lastchair::ChairsError::InvalidRequest {
                    info: format!("invalid host address {host_ip}:{host_port}"),
                }
            })?;
            let tracker = lobby::host(bind_addr, name)?;
            (tracker, bind_addr, true)
        }
        LaunchMode::Player {
            host_ip,
            host_port,
            player_ip,
            player_port,
            ..
        } => {
            let host_addr: SocketAddr = format!("{host_ip}:{host_port}").parse().map_err(|_| {
                lastchair::ChairsError::InvalidRequest {
                    info: format!("invalid host address {host_ip}:{host_port}"),
                }
            })?;
            let player_addr: SocketAddr =
                format!("{player_ip}:{player_port}")
                    .parse()
                    .map_err(|_| lastchair::ChairsError::InvalidRequest {
                        info: format!("invalid player address {player_ip}:{player_port}"),
                    })?;
            let tracker = lobby::join(host_addr, player_addr, name)?;
            (tracker, player_addr, false)
        }
    };

    println!("Entering game with name: {name}...");
    let self_player = Player::new(name);
    let config = GameConfig::default();
    let transport = Transport::bind(self_player.clone(), bind_addr, &tracker, config.connect_retry_interval)?;
    transport.connect_mesh(&tracker);

    let mut fsm = GameFsm::new(self_player, &tracker, transport, config, is_host);
    fsm.run();

    match fsm.winner() {
        Some(winner) => println!("{winner} has won the game!"),
        None => println!("Hope you had fun!"),
    }
    Ok(())
}

fn hh_mm_ss_now() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let secs_of_day = now % 86_400;
    format!(
        "{:02}-{:02}-{:02}",
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}
