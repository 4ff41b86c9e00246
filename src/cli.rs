use clap::Parser;

use crate::error::ChairsError;
use crate::namegen::random_name;

/// Command-line arguments (§6). Mirrors the original's single-dash flag names exactly; `-n`
/// falls back to a generated two-word name when omitted.
#[derive(Debug, Parser)]
#[command(name = "lastchair", about = "A fully peer-to-peer musical-chairs elimination game")]
pub struct Cli {
    /// "host" to start a new lobby, anything else (or omitted) to join one.
    #[arg(short = 'm', long = "m")]
    pub mode: Option<String>,

    /// Host's IP address (required in player mode).
    #[arg(long = "ip")]
    pub host_ip: Option<String>,

    /// This player's own IP address (required in player mode).
    #[arg(long = "pip")]
    pub player_ip: Option<String>,

    /// Host's listening port.
    #[arg(long = "hp")]
    pub host_port: Option<u16>,

    /// This player's own listening port (required in player mode).
    #[arg(long = "pp")]
    pub player_port: Option<u16>,

    /// Display name. Random two-word name if omitted.
    #[arg(short = 'n', long = "n")]
    pub name: Option<String>,
}

/// Resolved, validated launch configuration derived from [`Cli`] (§6).
#[derive(Debug, Clone)]
pub enum LaunchMode {
    Host {
        name: String,
        host_ip: String,
        host_port: u16,
    },
    Player {
        name: String,
        host_ip: String,
        host_port: u16,
        player_ip: String,
        player_port: u16,
    },
}

const DEFAULT_HOST_PORT: u16 = 9999;

impl Cli {
    /// Validates the raw arguments into a [`LaunchMode`], matching the original's requirement
    /// that player mode needs all four of ip/pip/hp/pp.
    pub fn into_launch_mode(self) -> Result<LaunchMode, ChairsError> {
        let name = self.name.unwrap_or_else(random_name);
        let is_host = self.mode.as_deref() == Some("host");

        if is_host {
            return Ok(LaunchMode::Host {
                name,
                host_ip: self.host_ip.unwrap_or_else(|| "0.0.0.0".to_string()),
                host_port: self.host_port.unwrap_or(DEFAULT_HOST_PORT),
            });
        }

        let (Some(host_ip), Some(player_ip), Some(host_port), Some(player_port)) =
            (self.host_ip, self.player_ip, self.host_port, self.player_port)
        else {
            return Err(ChairsError::InvalidRequest {
                info: "player mode requires -ip, -pip, -hp, and -pp".to_string(),
            });
        };

        Ok(LaunchMode::Player {
            name,
            host_ip,
            host_port,
            player_ip,
            player_port,
        })
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn test_host_mode_defaults_port_when_omitted() {
        let cli = Cli {
            mode: Some("host".into()),
            host_ip: None,
            player_ip: None,
            host_port: None,
            player_port: None,
            name: Some("alice".into()),
        };
        match cli.into_launch_mode().unwrap() {
            LaunchMode::Host { name, host_port, .. } => {
                assert_eq!(name, "alice");
                assert_eq!(host_port, DEFAULT_HOST_PORT);
            }
            LaunchMode::Player { .. } => panic!("expected host mode"),
        }
    }

    #[test]
    fn test_player_mode_requires_all_four_addresses() {
        let cli = Cli {
            mode: None,
            host_ip: Some("127.0.0.1".into()),
            player_ip: None,
            host_port: Some(9999),
            player_port: None,
            name: None,
        };
        let err = cli.into_launch_mode().unwrap_err();
        assert!(matches!(err, ChairsError::InvalidRequest { .. }));
    }

    #[test]
    fn test_player_mode_succeeds_with_all_four() {
        let cli = Cli {
            mode: None,
            host_ip: Some("127.0.0.1".into()),
            player_ip: Some("127.0.0.1".into()),
            host_port: Some(9999),
            player_port: Some(9000),
            name: Some("bob".into()),
        };
        assert!(matches!(cli.into_launch_mode().unwrap(), LaunchMode::Player { .. }));
    }
}
