//! In-process cluster simulation
//!
//! Boots a cluster of nodes on an [`InMemoryNetwork`], starting one every
//! `join_stagger_ticks` ticks through a shared introducer, crashes a seeded
//! random selection of them at `fail_at_tick`, and reports what each
//! surviving node ended up believing about the group.
use std::collections::BTreeSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::AuditSink;
use crate::error::Result;
use crate::node::{MembershipNode, NodeId, NodePhase, NodeStats};
use crate::settings::{ProtocolConfig, SimulationSettings};
use crate::transport::{InMemoryNetwork, Transport, TransportStatsSnapshot};

/// Address of the `index`-th simulated node; index 0 is the introducer
pub fn simulated_node_id(index: usize) -> NodeId {
    NodeId::new(((index + 1) as u32).to_le_bytes(), 0)
}

/// Final state of one simulated node
#[derive(Clone, Debug, Serialize)]
pub struct NodeReport {
    pub id: NodeId,
    pub phase: NodePhase,
    pub crashed: bool,
    pub members: Vec<NodeId>,
    pub stats: NodeStats,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimulationReport {
    pub ticks: u64,
    pub nodes: Vec<NodeReport>,
    pub crashed: Vec<NodeId>,
    pub network: TransportStatsSnapshot,
}

impl SimulationReport {
    /// Nodes still participating at the end of the run
    pub fn live_members(&self) -> BTreeSet<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.phase == NodePhase::Member)
            .map(|n| n.id)
            .collect()
    }

    /// True when every live member sees exactly the other live members
    pub fn converged(&self) -> bool {
        let live = self.live_members();
        self.nodes
            .iter()
            .filter(|n| n.phase == NodePhase::Member)
            .all(|n| {
                let expected: BTreeSet<NodeId> =
                    live.iter().copied().filter(|id| *id != n.id).collect();
                let seen: BTreeSet<NodeId> = n.members.iter().copied().collect();
                seen == expected
            })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct Simulation {
    settings: SimulationSettings,
    network: Arc<InMemoryNetwork>,
    nodes: Vec<MembershipNode>,
    start_ticks: Vec<u64>,
    to_crash: Vec<usize>,
    crashed: Vec<NodeId>,
    tick: u64,
}

impl Simulation {
    pub fn new(
        settings: SimulationSettings,
        protocol: ProtocolConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        settings.validate()?;
        protocol.validate()?;

        let network = Arc::new(InMemoryNetwork::lossy(settings.drop_rate, settings.seed)?);
        let mut nodes = Vec::with_capacity(settings.nodes);
        let mut start_ticks = Vec::with_capacity(settings.nodes);
        for index in 0..settings.nodes {
            let transport: Arc<dyn Transport> = network.clone();
            nodes.push(MembershipNode::with_rng(
                simulated_node_id(index),
                protocol.clone(),
                transport,
                audit.clone(),
                StdRng::seed_from_u64(settings.seed.wrapping_add(index as u64 + 1)),
            )?);
            start_ticks.push(index as u64 * settings.join_stagger_ticks);
        }

        // the introducer is only picked when every node has to fail
        let mut rng = StdRng::seed_from_u64(settings.seed);
        let candidates: Vec<usize> = (1..settings.nodes).collect();
        let mut to_crash: Vec<usize> = candidates
            .choose_multiple(&mut rng, settings.fail_count)
            .copied()
            .collect();
        if settings.fail_count > candidates.len() {
            to_crash.push(0);
        }
        to_crash.sort_unstable();

        Ok(Self {
            settings,
            network,
            nodes,
            start_ticks,
            to_crash,
            crashed: Vec::new(),
            tick: 0,
        })
    }

    /// Nodes scheduled to crash at `fail_at_tick`
    pub fn doomed(&self) -> Vec<NodeId> {
        self.to_crash.iter().map(|i| simulated_node_id(*i)).collect()
    }

    /// Advance the whole cluster by one tick
    pub fn step(&mut self) {
        let introducer = simulated_node_id(0);

        for (index, node) in self.nodes.iter_mut().enumerate() {
            if self.start_ticks[index] == self.tick && node.phase() == NodePhase::Bootstrapping {
                if let Err(e) = node.start(introducer) {
                    warn!("[{}] Could not start: {}", node.id(), e);
                }
            }
        }

        if self.tick == self.settings.fail_at_tick {
            for index in &self.to_crash {
                let node = &mut self.nodes[*index];
                node.crash();
                self.crashed.push(node.id());
            }
        }

        for node in self.nodes.iter_mut() {
            if let Err(e) = node.tick() {
                warn!("[{}] {}", node.id(), e);
            }
        }
        self.tick += 1;
    }

    /// Run the configured number of ticks and report
    pub fn run(mut self) -> SimulationReport {
        info!(
            "Simulating {} nodes for {} ticks ({} to fail at tick {}, drop rate {})",
            self.settings.nodes,
            self.settings.ticks,
            self.settings.fail_count,
            self.settings.fail_at_tick,
            self.settings.drop_rate
        );
        while self.tick < self.settings.ticks {
            self.step();
        }
        let report = self.report();
        info!(
            "Simulation finished: {} live members, converged: {}",
            report.live_members().len(),
            report.converged()
        );
        report
    }

    pub fn report(&self) -> SimulationReport {
        let nodes = self
            .nodes
            .iter()
            .map(|node| NodeReport {
                id: node.id(),
                phase: node.phase(),
                crashed: self.crashed.contains(&node.id()),
                members: node.current_members().iter().map(|m| m.id).collect(),
                stats: node.stats(),
            })
            .collect();
        SimulationReport {
            ticks: self.tick,
            nodes,
            crashed: self.crashed.clone(),
            network: self.network.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEvent, RecordingAuditLog};

    fn small(nodes: usize, fail_count: usize) -> SimulationSettings {
        SimulationSettings {
            nodes,
            ticks: 60,
            join_stagger_ticks: 1,
            fail_count,
            fail_at_tick: 1_000,
            drop_rate: 0.0,
            seed: 42,
        }
    }

    #[test]
    fn test_simulated_ids_start_at_default_introducer() {
        assert_eq!(simulated_node_id(0), NodeId::default_introducer());
        assert_eq!(simulated_node_id(1), NodeId::new([2, 0, 0, 0], 0));
        assert_eq!(simulated_node_id(255), NodeId::new([0, 1, 0, 0], 0));
    }

    #[test]
    fn test_introducer_not_chosen_to_fail_when_avoidable() {
        let sim = Simulation::new(
            small(5, 4),
            ProtocolConfig::default(),
            Arc::new(RecordingAuditLog::new()),
        )
        .unwrap();
        let doomed = sim.doomed();
        assert_eq!(doomed.len(), 4);
        assert!(!doomed.contains(&simulated_node_id(0)));
    }

    #[test]
    fn test_cluster_converges_without_failures() {
        let sim = Simulation::new(
            small(6, 0),
            ProtocolConfig::default(),
            Arc::new(RecordingAuditLog::new()),
        )
        .unwrap();
        let report = sim.run();
        assert_eq!(report.live_members().len(), 6);
        assert!(report.converged(), "{}", report.to_json().unwrap());
    }

    #[test]
    fn test_large_cluster_converges_with_scaled_thresholds() {
        let audit = Arc::new(RecordingAuditLog::new());
        let protocol = ProtocolConfig {
            tfail: 60,
            tremove: 240,
            ..ProtocolConfig::default()
        };
        let settings = SimulationSettings {
            ticks: 400,
            ..small(30, 0)
        };
        let report = Simulation::new(settings, protocol, audit.clone())
            .unwrap()
            .run();
        assert_eq!(report.live_members().len(), 30);
        assert!(report.converged(), "{}", report.to_json().unwrap());
        assert!(!audit
            .records()
            .iter()
            .any(|(_, event)| matches!(event, AuditEvent::NodeRemove(_))));
    }

    #[test]
    fn test_report_serializes() {
        let sim = Simulation::new(
            small(2, 0),
            ProtocolConfig::default(),
            Arc::new(RecordingAuditLog::new()),
        )
        .unwrap();
        let json: serde_json::Value = serde_json::from_str(&sim.report().to_json().unwrap()).unwrap();
        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["nodes"][0]["phase"], "Bootstrapping");
    }
}
