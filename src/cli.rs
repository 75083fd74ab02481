//! CLI for this application
//!
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;

use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
#[clap(name = settings::APP_NAME, version = settings::APP_VERSION)]
pub struct Cli {
    // Address to bind and identify as
    #[clap(
        long,
        default_value = "127.0.0.1",
        env("GOSSAMER_LISTEN_ADDRESS"),
        help = "IPv4 address to listen on; peers know this node by it"
    )]
    pub listen_address: Ipv4Addr,

    // UDP listen port for membership traffic
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_UDP,
        env("GOSSAMER_UDP_LISTEN_PORT"),
        help = "Port to bind the membership UDP socket to"
    )]
    pub listen_port_udp: u16,

    // Introducer address
    #[clap(
        long,
        default_value = settings::DEFAULT_INTRODUCER,
        env("GOSSAMER_INTRODUCER"),
        help = "Well-known address new nodes join through; a node listening here starts the group"
    )]
    pub introducer: SocketAddrV4,

    #[clap(
        long,
        default_value = "1000",
        env("GOSSAMER_TICK_INTERVAL_MS"),
        help = "Milliseconds per protocol tick"
    )]
    pub tick_interval_ms: u64,

    #[clap(
        long,
        default_value = "5",
        env("GOSSAMER_TFAIL"),
        help = "Silent ticks before a peer is suspected"
    )]
    pub tfail: u64,

    #[clap(
        long,
        default_value = "20",
        env("GOSSAMER_TREMOVE"),
        help = "Silent ticks before a peer is removed"
    )]
    pub tremove: u64,

    #[clap(
        long,
        default_value = "5",
        env("GOSSAMER_JOIN_RETRY_TICKS"),
        help = "Ticks between JOINREQ retries while joining"
    )]
    pub join_retry_ticks: u64,

    #[clap(
        long,
        default_value = "10",
        env("GOSSAMER_MAX_JOIN_ATTEMPTS"),
        help = "JOINREQ sends before bootstrap is declared failed"
    )]
    pub max_join_attempts: u32,

    #[clap(
        long,
        default_value = "2",
        env("GOSSAMER_MIN_PEERS_FOR_PING"),
        help = "Known peers required before a round sends a PING"
    )]
    pub min_peers_for_ping: usize,

    // Mode of operation
    #[clap(
        long,
        default_value = "node",
        env("GOSSAMER_RUN_MODE"),
        help = "run-mode: 'node' (UDP) or 'simulate' (in-process cluster)"
    )]
    pub run_mode: settings::RunMode,

    #[clap(long, default_value = "10", env("GOSSAMER_SIM_NODES"), help = "Simulated cluster size")]
    pub sim_nodes: usize,

    #[clap(long, default_value = "700", env("GOSSAMER_SIM_TICKS"), help = "Ticks to simulate")]
    pub sim_ticks: u64,

    #[clap(
        long,
        default_value = "1",
        env("GOSSAMER_SIM_JOIN_STAGGER"),
        help = "Ticks between simulated node starts"
    )]
    pub sim_join_stagger: u64,

    #[clap(
        long,
        default_value = "1",
        env("GOSSAMER_SIM_FAIL_COUNT"),
        help = "Simulated nodes to crash"
    )]
    pub sim_fail_count: usize,

    #[clap(
        long,
        default_value = "100",
        env("GOSSAMER_SIM_FAIL_AT"),
        help = "Tick at which simulated nodes crash"
    )]
    pub sim_fail_at: u64,

    #[clap(
        long,
        default_value = "0.0",
        env("GOSSAMER_SIM_DROP_RATE"),
        help = "Probability the simulated network drops a message"
    )]
    pub sim_drop_rate: f64,

    #[clap(long, default_value = "0", env("GOSSAMER_SIM_SEED"), help = "Simulation rng seed")]
    pub sim_seed: u64,

    #[clap(
        long,
        env("GOSSAMER_AUDIT_LOG"),
        help = "Write membership events as JSON lines to this file"
    )]
    pub audit_log: Option<PathBuf>,

    #[clap(long, env("GOSSAMER_LOG_JSON"), help = "Emit logs as JSON")]
    pub log_json: bool,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            listen_address: self.listen_address,
            listen_port_udp: self.listen_port_udp,
            introducer: self.introducer,
            tick_interval_ms: self.tick_interval_ms,
            protocol: settings::ProtocolConfig {
                tfail: self.tfail,
                tremove: self.tremove,
                join_retry_ticks: self.join_retry_ticks,
                max_join_attempts: self.max_join_attempts,
                min_peers_for_ping: self.min_peers_for_ping,
            },
            run_mode: self.run_mode,
            simulation: settings::SimulationSettings {
                nodes: self.sim_nodes,
                ticks: self.sim_ticks,
                join_stagger_ticks: self.sim_join_stagger,
                fail_count: self.sim_fail_count,
                fail_at_tick: self.sim_fail_at,
                drop_rate: self.sim_drop_rate,
                seed: self.sim_seed,
            },
            audit_log: self.audit_log,
            log_json: self.log_json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_produce_valid_settings() {
        let cli = Cli::parse_from(["gossamer"]);
        let settings = cli.into_settings();
        assert_eq!(settings.listen_port_udp, settings::STANDARD_PORT_UDP);
        assert_eq!(settings.protocol, settings::ProtocolConfig::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_simulate_flags() {
        let cli = Cli::parse_from([
            "gossamer",
            "--run-mode",
            "simulate",
            "--sim-nodes",
            "4",
            "--sim-drop-rate",
            "0.1",
        ]);
        let settings = cli.into_settings();
        assert_eq!(settings.run_mode, settings::RunMode::Simulate);
        assert_eq!(settings.simulation.nodes, 4);
        assert!((settings.simulation.drop_rate - 0.1).abs() < f64::EPSILON);
    }
}
