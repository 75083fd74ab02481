//! gossamer application settings
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use crate::config_error;
use crate::error::Result;
use crate::node::NodeId;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_UDP: u16 = 8412;
pub const DEFAULT_PORT_UDP: &str = "8412";
pub const DEFAULT_INTRODUCER: &str = "127.0.0.1:8412";

/// Ticks of silence before a peer is suspected
pub const DEFAULT_TFAIL: u64 = 5;
/// Ticks of silence before a peer is removed
pub const DEFAULT_TREMOVE: u64 = 20;
pub const DEFAULT_JOIN_RETRY_TICKS: u64 = 5;
pub const DEFAULT_MAX_JOIN_ATTEMPTS: u32 = 10;
pub const DEFAULT_MIN_PEERS_FOR_PING: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// One node on a real UDP socket
    Node,
    /// Many nodes on an in-process network with simulated ticks
    Simulate,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Node => write!(f, "node"),
            RunMode::Simulate => write!(f, "simulate"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "node" => Ok(RunMode::Node),
            "simulate" => Ok(RunMode::Simulate),
            _ => Err(format!("Invalid run-mode: {}", s)),
        }
    }
}

/// Protocol timing, all expressed in ticks
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub tfail: u64,
    pub tremove: u64,
    // JOINREQ is re-sent every this many ticks while joining
    pub join_retry_ticks: u64,
    // JOINREQ sends before giving up on bootstrap
    pub max_join_attempts: u32,
    // Peers required before a round sends a PING
    pub min_peers_for_ping: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            tfail: DEFAULT_TFAIL,
            tremove: DEFAULT_TREMOVE,
            join_retry_ticks: DEFAULT_JOIN_RETRY_TICKS,
            max_join_attempts: DEFAULT_MAX_JOIN_ATTEMPTS,
            min_peers_for_ping: DEFAULT_MIN_PEERS_FOR_PING,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tfail == 0 {
            return Err(config_error!("tfail must be at least 1 tick"));
        }
        if self.tremove <= self.tfail {
            return Err(config_error!(
                "tremove ({}) must be greater than tfail ({})",
                self.tremove,
                self.tfail
            ));
        }
        if self.join_retry_ticks == 0 {
            return Err(config_error!("join retry interval must be at least 1 tick"));
        }
        if self.max_join_attempts == 0 {
            return Err(config_error!("at least one join attempt is required"));
        }
        if self.min_peers_for_ping == 0 {
            return Err(config_error!("min peers for ping must be at least 1"));
        }
        Ok(())
    }
}

/// Parameters of an in-process simulation run
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationSettings {
    pub nodes: usize,
    pub ticks: u64,
    // A new node starts every this many ticks
    pub join_stagger_ticks: u64,
    // Nodes crashed at `fail_at_tick`
    pub fail_count: usize,
    pub fail_at_tick: u64,
    pub drop_rate: f64,
    pub seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            nodes: 10,
            ticks: 700,
            join_stagger_ticks: 1,
            fail_count: 1,
            fail_at_tick: 100,
            drop_rate: 0.0,
            seed: 0,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 {
            return Err(config_error!("simulation needs at least one node"));
        }
        if self.fail_count > self.nodes {
            return Err(config_error!(
                "cannot fail {} of {} nodes",
                self.fail_count,
                self.nodes
            ));
        }
        if !(0.0..1.0).contains(&self.drop_rate) {
            return Err(config_error!(
                "drop rate must be in [0, 1), got {}",
                self.drop_rate
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Address this node binds and identifies as
    pub listen_address: Ipv4Addr,

    // UDP listen port for membership traffic
    pub listen_port_udp: u16,

    // Well-known address new nodes send JOINREQ to
    pub introducer: SocketAddrV4,

    // Wall-clock length of one protocol tick
    pub tick_interval_ms: u64,

    pub protocol: ProtocolConfig,

    // Mode of operation
    pub run_mode: RunMode,

    pub simulation: SimulationSettings,

    // Optional JSON-lines audit log of membership changes
    pub audit_log: Option<PathBuf>,

    // Emit logs as JSON instead of plain text
    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: Ipv4Addr::LOCALHOST,
            listen_port_udp: STANDARD_PORT_UDP,
            introducer: SocketAddrV4::new(Ipv4Addr::LOCALHOST, STANDARD_PORT_UDP),
            tick_interval_ms: 1000,
            protocol: ProtocolConfig::default(),
            run_mode: RunMode::Node,
            simulation: SimulationSettings::default(),
            audit_log: None,
            log_json: false,
        }
    }
}

impl Settings {
    pub fn node_id(&self) -> NodeId {
        NodeId::from(self.listen_socket_addr())
    }

    pub fn introducer_id(&self) -> NodeId {
        NodeId::from(self.introducer)
    }

    pub fn listen_socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.listen_address, self.listen_port_udp)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.protocol.validate()?;
        if self.tick_interval_ms == 0 {
            return Err(config_error!("tick interval must be positive"));
        }
        match self.run_mode {
            RunMode::Node => {
                if self.listen_address.is_unspecified() {
                    return Err(config_error!(
                        "listen address must be routable; peers identify this node by it"
                    ));
                }
                if self.node_id().is_null() || self.introducer_id().is_null() {
                    return Err(config_error!("node and introducer addresses must not be null"));
                }
            }
            RunMode::Simulate => self.simulation.validate()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
        assert_eq!(ProtocolConfig::default().tfail, 5);
        assert_eq!(ProtocolConfig::default().tremove, 20);
    }

    #[test]
    fn test_tremove_must_exceed_tfail() {
        let protocol = ProtocolConfig {
            tfail: 10,
            tremove: 10,
            ..ProtocolConfig::default()
        };
        let err = protocol.validate().unwrap_err();
        assert!(err.to_string().contains("tremove (10) must be greater than tfail (10)"));
    }

    #[test]
    fn test_unspecified_listen_address_rejected() {
        let settings = Settings {
            listen_address: Ipv4Addr::UNSPECIFIED,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_simulation_drop_rate_bounds() {
        let settings = Settings {
            run_mode: RunMode::Simulate,
            simulation: SimulationSettings {
                drop_rate: 1.0,
                ..SimulationSettings::default()
            },
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_run_mode_parse() {
        assert_eq!("Simulate".parse::<RunMode>().unwrap(), RunMode::Simulate);
        assert!("gossip".parse::<RunMode>().is_err());
    }
}
